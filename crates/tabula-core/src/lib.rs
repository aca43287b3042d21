//! # tabula-core
//!
//! Core data types for the tabula spreadsheet engine.
//!
//! This crate provides the fundamental types shared by the parser and the
//! engine:
//! - [`CellAddress`] and [`Size`] - cell addressing and window dimensions
//! - [`Value`] - evaluated cell values (numbers, text, formula errors)
//! - [`Error`] - structural errors (bad addresses, parse failures, cycles)
//!
//! ## Example
//!
//! ```rust
//! use tabula_core::CellAddress;
//!
//! let addr = CellAddress::parse("AB12").unwrap();
//! assert_eq!(addr.row, 11);
//! assert_eq!(addr.col, 27);
//! assert_eq!(addr.to_string(), "AB12");
//! ```

pub mod error;
pub mod position;
pub mod value;

// Re-exports for convenience
pub use error::{Error, Result};
pub use position::{CellAddress, Size};
pub use value::{CellError, Value};

/// Maximum number of rows in a sheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a sheet
pub const MAX_COLS: u16 = 16_384;

/// First character of formula input
pub const FORMULA_SIGN: char = '=';

/// Leading character that forces text display of whatever follows
pub const ESCAPE_SIGN: char = '\'';
