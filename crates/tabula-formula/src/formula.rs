//! The owning formula handle

use crate::ast::Expr;
use crate::error::ParseResult;
use crate::eval::{evaluate, SheetView};
use crate::parser::parse_expression_text;
use tabula_core::{CellAddress, Value};

/// A parsed formula expression
///
/// Owns the AST, knows which cells it reads from, and can evaluate itself
/// against any [`SheetView`].
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
    referenced: Vec<CellAddress>,
}

impl Formula {
    /// Parse an expression (without the leading `=`)
    ///
    /// # Examples
    /// ```rust
    /// use tabula_formula::Formula;
    ///
    /// let formula = Formula::parse("(1+2)*A1").unwrap();
    /// assert_eq!(formula.expression(), "(1+2)*A1");
    /// assert_eq!(formula.referenced_cells().len(), 1);
    /// ```
    pub fn parse(expression: &str) -> ParseResult<Self> {
        let expr = parse_expression_text(expression)?;

        let mut referenced = Vec::new();
        collect_references(&expr, &mut referenced);
        referenced.sort_unstable();
        referenced.dedup();

        Ok(Self { expr, referenced })
    }

    /// Canonical expression text, without the leading `=`
    pub fn expression(&self) -> String {
        self.expr.to_string()
    }

    /// Evaluate against a sheet view
    ///
    /// Returns [`Value::Number`] or [`Value::Error`], never text.
    pub fn evaluate(&self, view: &dyn SheetView) -> Value {
        evaluate(&self.expr, view)
    }

    /// The in-bounds cells this formula reads from, sorted and deduplicated
    ///
    /// Out-of-range references do not appear here; they surface as `#REF!`
    /// at evaluation time instead.
    pub fn referenced_cells(&self) -> &[CellAddress] {
        &self.referenced
    }
}

fn collect_references(expr: &Expr, refs: &mut Vec<CellAddress>) {
    match expr {
        Expr::CellRef(addr) => refs.push(*addr),
        Expr::BinaryOp { left, right, .. } => {
            collect_references(left, refs);
            collect_references(right, refs);
        }
        Expr::UnaryOp { operand, .. } => collect_references(operand, refs),
        Expr::Number(_) | Expr::InvalidRef(_) => {}
    }
}
