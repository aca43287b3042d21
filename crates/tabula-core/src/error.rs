//! Error types for tabula-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors reported at the operation boundary
///
/// Evaluation failures are not errors in this sense: they are
/// [`Value::Error`](crate::Value) values that flow through formula
/// composition instead of aborting the call.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Row index out of bounds
    #[error("Row index {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column index out of bounds
    #[error("Column index {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u32, u32),

    /// Formula parse error
    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    /// Circular reference detected
    #[error("Circular reference detected involving cell {0}")]
    CircularReference(String),
}
