//! Formula evaluation
//!
//! Evaluates formula ASTs against a read-only sheet view.

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use tabula_core::{CellAddress, CellError, Value};

/// Read-only view of a sheet, as seen by a formula during evaluation
///
/// `None` means the sheet holds nothing at `addr` - no cell at all, or an
/// empty one. The evaluator coerces both to zero, so the distinction stays
/// the engine's business.
pub trait SheetView {
    /// The evaluated value of the cell at `addr`, if the sheet holds one
    fn cell_value(&self, addr: CellAddress) -> Option<Value>;
}

/// Evaluate an expression to a number or a formula error value
pub(crate) fn evaluate(expr: &Expr, view: &dyn SheetView) -> Value {
    match eval(expr, view) {
        Ok(n) => Value::Number(n),
        Err(e) => Value::Error(e),
    }
}

fn eval(expr: &Expr, view: &dyn SheetView) -> Result<f64, CellError> {
    match expr {
        Expr::Number(n) => Ok(*n),

        Expr::CellRef(addr) => coerce_referent(view.cell_value(*addr)),

        Expr::InvalidRef(_) => Err(CellError::Ref),

        Expr::UnaryOp {
            op: UnaryOperator::Negate,
            operand,
        } => Ok(-eval(operand, view)?),

        Expr::BinaryOp { op, left, right } => {
            let left = eval(left, view)?;
            let right = eval(right, view)?;
            let result = match op {
                BinaryOperator::Add => left + right,
                BinaryOperator::Subtract => left - right,
                BinaryOperator::Multiply => left * right,
                BinaryOperator::Divide => left / right,
            };
            // Division by zero and overflow both land here
            if result.is_finite() {
                Ok(result)
            } else {
                Err(CellError::Arithmetic)
            }
        }
    }
}

/// Coerce a referent's value to a number
///
/// Absent and empty referents contribute zero; text contributes its full
/// numeric reading or `#VALUE!`; errors propagate.
fn coerce_referent(value: Option<Value>) -> Result<f64, CellError> {
    match value {
        None => Ok(0.0),
        Some(Value::Number(n)) => Ok(n),
        Some(Value::Text(s)) => s
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or(CellError::Value),
        Some(Value::Error(e)) => Err(e),
    }
}
