//! Formula abstract syntax tree types

use std::fmt;
use tabula_core::CellAddress;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Reference to a cell inside the sheet bounds
    CellRef(CellAddress),
    /// A token that lexed like a cell reference but names a position outside
    /// the sheet bounds (e.g. `XFE1`, `A0`). Kept so the canonical text can
    /// reproduce it; evaluates to `#REF!`.
    InvalidRef(String),
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOperator {
    /// Operator symbol as it appears in formula text
    pub fn symbol(self) -> char {
        match self {
            BinaryOperator::Add => '+',
            BinaryOperator::Subtract => '-',
            BinaryOperator::Multiply => '*',
            BinaryOperator::Divide => '/',
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Add | BinaryOperator::Subtract => 1,
            BinaryOperator::Multiply | BinaryOperator::Divide => 2,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
}

impl Expr {
    const UNARY_PRECEDENCE: u8 = 3;
    const ATOM_PRECEDENCE: u8 = 4;

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(_) | Expr::CellRef(_) | Expr::InvalidRef(_) => Self::ATOM_PRECEDENCE,
            Expr::UnaryOp { .. } => Self::UNARY_PRECEDENCE,
            Expr::BinaryOp { op, .. } => op.precedence(),
        }
    }
}

/// Canonical rendering: minimal whitespace, parentheses only where
/// precedence or associativity requires them to preserve the parse.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Expr::Number(n) => write!(f, "{}", n),
            Expr::CellRef(addr) => write!(f, "{}", addr),
            Expr::InvalidRef(text) => f.write_str(text),
            Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand,
            } => {
                if operand.precedence() < Self::UNARY_PRECEDENCE {
                    write!(f, "-({})", operand)
                } else {
                    write!(f, "-{}", operand)
                }
            }
            Expr::BinaryOp { op, left, right } => {
                if left.precedence() < self.precedence() {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, "{}", op.symbol())?;
                // The right operand of `-` and `/` binds the rest of the
                // group, so an equal-precedence subtree keeps its parens.
                let grouped = right.precedence() < self.precedence()
                    || (right.precedence() == self.precedence()
                        && matches!(op, BinaryOperator::Subtract | BinaryOperator::Divide));
                if grouped {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
        }
    }
}
