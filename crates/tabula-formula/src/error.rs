//! Formula parse errors

use thiserror::Error;

/// Result type for formula parsing
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Errors that can occur while parsing a formula expression
///
/// A parse failure rejects the whole formula; the engine surfaces it
/// without changing any cell state.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed input at a known place
    #[error("Parse error: {0}")]
    Syntax(String),

    /// Input ended where a term or operator was required
    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    /// A complete expression was parsed but input remains
    #[error("Unexpected characters after expression: '{0}'")]
    TrailingInput(String),
}
