//! Formula parser
//!
//! A recursive descent parser for the arithmetic formula language with
//! proper operator precedence.

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{ParseError, ParseResult};
use tabula_core::{CellAddress, Error};

/// Parse an expression (without the leading `=`) into an AST
pub(crate) fn parse_expression_text(input: &str) -> ParseResult<Expr> {
    let mut parser = FormulaParser::new(input)?;
    let expr = parser.parse_additive()?;

    // Make sure we consumed all input
    if !matches!(parser.current_token(), Token::Eof) {
        return Err(ParseError::TrailingInput(
            input[parser.token_start..].trim().to_string(),
        ));
    }

    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Number literal
    Number(f64),
    /// Cell reference text like A1 (bounds checked later)
    CellRef(String),

    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,

    /// End of input
    Eof,
}

/// Formula parser
struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    /// Byte offset where the current token begins, for error reporting
    token_start: usize,
    current_token: Token,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            token_start: 0,
            current_token: Token::Eof,
        };
        parser.advance_token()?;
        Ok(parser)
    }

    // === Token scanning ===

    fn advance_token(&mut self) -> ParseResult<()> {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.current_token = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> ParseResult<Token> {
        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let c = self.peek_char().unwrap_or('\0');

        match c {
            '+' => {
                self.advance();
                return Ok(Token::Plus);
            }
            '-' => {
                self.advance();
                return Ok(Token::Minus);
            }
            '*' => {
                self.advance();
                return Ok(Token::Star);
            }
            '/' => {
                self.advance();
                return Ok(Token::Slash);
            }
            '(' => {
                self.advance();
                return Ok(Token::LeftParen);
            }
            ')' => {
                self.advance();
                return Ok(Token::RightParen);
            }
            _ => {}
        }

        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        if c.is_ascii_uppercase() {
            return self.scan_cell_ref();
        }

        Err(ParseError::Syntax(format!("unexpected character '{}'", c)))
    }

    fn scan_number(&mut self) -> ParseResult<Token> {
        let start = self.pos;

        // Integer part
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        if self.peek_char().is_some_and(|c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek_char().is_some_and(|c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.pos];
        let num: f64 = num_str
            .parse()
            .map_err(|_| ParseError::Syntax(format!("invalid number literal '{}'", num_str)))?;

        if !num.is_finite() {
            return Err(ParseError::Syntax(format!(
                "number literal '{}' out of range",
                num_str
            )));
        }

        Ok(Token::Number(num))
    }

    fn scan_cell_ref(&mut self) -> ParseResult<Token> {
        let start = self.pos;

        while self.peek_char().is_some_and(|c| c.is_ascii_uppercase()) {
            self.advance();
        }

        let digit_start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.pos == digit_start {
            return Err(ParseError::Syntax(format!(
                "expected cell reference, got '{}'",
                &self.input[start..self.pos]
            )));
        }

        Ok(Token::CellRef(self.input[start..self.pos].to_string()))
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_token(&self) -> &Token {
        &self.current_token
    }

    fn consume(&mut self) -> ParseResult<Token> {
        let token = std::mem::replace(&mut self.current_token, Token::Eof);
        self.advance_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> ParseResult<()> {
        if self.current_token() == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(ParseError::Syntax(format!(
                "expected {:?}, got {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    // === Expression parsing with precedence ===
    // 1. Addition/Subtraction: +, -
    // 2. Multiplication/Division: *, /
    // 3. Unary: -, +
    // 4. Primary: number literals, cell references, parentheses

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if matches!(self.current_token(), Token::Minus) {
            self.consume()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        // Prefix plus (no-op)
        if matches!(self.current_token(), Token::Plus) {
            self.consume()?;
            return self.parse_unary();
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.consume()?;
                Ok(Expr::Number(n))
            }

            Token::LeftParen => {
                self.consume()?;
                let expr = self.parse_additive()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }

            Token::CellRef(text) => {
                self.consume()?;
                // Out-of-range references stay in the AST and evaluate to
                // #REF!; malformed ones ("A0") get the same treatment.
                match CellAddress::parse(&text) {
                    Ok(addr) => Ok(Expr::CellRef(addr)),
                    Err(
                        Error::RowOutOfBounds(..)
                        | Error::ColumnOutOfBounds(..)
                        | Error::InvalidAddress(_),
                    ) => Ok(Expr::InvalidRef(text)),
                    Err(e) => Err(ParseError::Syntax(format!(
                        "invalid cell reference '{}': {}",
                        text, e
                    ))),
                }
            }

            Token::Eof => Err(ParseError::UnexpectedEnd),

            token => Err(ParseError::Syntax(format!("unexpected token {:?}", token))),
        }
    }
}
