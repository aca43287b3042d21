//! # tabula
//!
//! An in-memory, sparse spreadsheet engine.
//!
//! A [`Sheet`] maps cell addresses to cells holding text or formulas.
//! Formula cells reference other cells; the engine maintains the dependency
//! graph between them, rejects edits that would introduce a cycle,
//! evaluates formulas lazily with memoization, and transitively invalidates
//! memoized results when a referent changes. Cells a formula references
//! that do not exist yet are materialized empty.
//!
//! ## Example
//!
//! ```rust
//! use tabula::prelude::*;
//!
//! let mut sheet = Sheet::new();
//! let a1 = CellAddress::parse("A1").unwrap();
//! let a2 = CellAddress::parse("A2").unwrap();
//!
//! sheet.set_cell(a1, "2").unwrap();
//! sheet.set_cell(a2, "=A1+3").unwrap();
//! assert_eq!(sheet.cell(a2).unwrap().unwrap().value(), Value::Number(5.0));
//!
//! // Updating a referent reaches every dependent
//! sheet.set_cell(a1, "40").unwrap();
//! assert_eq!(sheet.cell(a2).unwrap().unwrap().value(), Value::Number(43.0));
//!
//! // A formula that would close a cycle is rejected
//! assert!(matches!(
//!     sheet.set_cell(a1, "=A2"),
//!     Err(Error::CircularReference(_))
//! ));
//! ```

mod cell;
mod sheet;

pub use sheet::{CellRef, Sheet};

// Re-exports for convenience
pub use tabula_core::{
    CellAddress, CellError, Error, Result, Size, Value, ESCAPE_SIGN, FORMULA_SIGN, MAX_COLS,
    MAX_ROWS,
};
pub use tabula_formula::{Formula, ParseError, SheetView};

/// Commonly used types
pub mod prelude {
    pub use crate::{CellAddress, CellError, Error, Sheet, Size, Value};
}
