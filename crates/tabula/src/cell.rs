//! Cell content and graph bookkeeping

use ahash::AHashSet;
use std::cell::RefCell;
use tabula_core::{CellAddress, Value, FORMULA_SIGN};
use tabula_formula::Formula;

/// The content stored in a cell
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellVariant {
    /// No content
    Empty,
    /// Raw text, kept exactly as entered (including any escape apostrophe)
    Text(String),
    /// A parsed formula
    Formula(Formula),
}

impl Default for CellVariant {
    fn default() -> Self {
        CellVariant::Empty
    }
}

/// A single cell: content, memoized value, and its dependency edges
///
/// Edges are addresses into the owning sheet's map, never references, so
/// the many-to-many graph carries no ownership.
#[derive(Debug, Default)]
pub(crate) struct Cell {
    pub(crate) variant: CellVariant,
    /// Memoized result of the last formula evaluation. Interior mutability
    /// lets read-only lookups fill it; the engine is single-threaded and
    /// the borrow never spans a nested evaluation.
    cache: RefCell<Option<Value>>,
    /// Cells this cell's formula reads from (outgoing edges)
    pub(crate) referents: AHashSet<CellAddress>,
    /// Cells whose formula reads from this cell (incoming edges)
    pub(crate) dependents: AHashSet<CellAddress>,
}

impl Cell {
    /// The stored text: `""` for empty cells, the raw input for text cells,
    /// `=` plus the canonical expression for formula cells
    pub(crate) fn text(&self) -> String {
        match &self.variant {
            CellVariant::Empty => String::new(),
            CellVariant::Text(raw) => raw.clone(),
            CellVariant::Formula(formula) => {
                format!("{}{}", FORMULA_SIGN, formula.expression())
            }
        }
    }

    /// True when the stored text is non-empty, without rendering it
    pub(crate) fn has_text(&self) -> bool {
        match &self.variant {
            CellVariant::Empty => false,
            CellVariant::Text(raw) => !raw.is_empty(),
            CellVariant::Formula(_) => true,
        }
    }

    /// Cells the formula reads from; empty for non-formula cells
    pub(crate) fn referenced_cells(&self) -> &[CellAddress] {
        match &self.variant {
            CellVariant::Formula(formula) => formula.referenced_cells(),
            _ => &[],
        }
    }

    /// True when some formula reads from this cell
    pub(crate) fn is_referenced(&self) -> bool {
        !self.dependents.is_empty()
    }

    pub(crate) fn cached_value(&self) -> Option<Value> {
        self.cache.borrow().clone()
    }

    pub(crate) fn store_cache(&self, value: Value) {
        *self.cache.borrow_mut() = Some(value);
    }

    /// Drop the memoized value; returns whether one was present
    pub(crate) fn take_cache(&self) -> bool {
        self.cache.borrow_mut().take().is_some()
    }

    #[cfg(test)]
    pub(crate) fn has_cache(&self) -> bool {
        self.cache.borrow().is_some()
    }
}
