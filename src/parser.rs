//! Parser for matrix literals
//!
//! Parses inputs like:
//! - `[[1, 2], [3, 4]]`
//! - `[1, 2, 3]` (a single row)
//! - `np.array([[9, 8], [7, 6]])`

use crate::error::{SystolicError, SystolicResult};
use crate::lexer::{Lexer, Token};
use crate::matrix::Matrix;

/// Parser for matrix literals
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Option<Token>,
    started: bool,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: None,
            started: false,
        }
    }

    /// Advance to the next token
    fn advance(&mut self) -> SystolicResult<Option<Token>> {
        let prev = self.current.take();
        self.current = match self.lexer.next() {
            Some(Ok(tok)) => Some(tok),
            Some(Err(())) => {
                let span = self.lexer.span();
                return Err(SystolicError::LexerError {
                    position: span.start,
                    message: "unexpected character in matrix literal".to_string(),
                });
            }
            None => None,
        };
        Ok(prev)
    }

    fn check(&self, expected: &Token) -> bool {
        self.current.as_ref() == Some(expected)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> SystolicResult<()> {
        if self.check(&expected) {
            self.advance()?;
            Ok(())
        } else {
            Err(SystolicError::parse_error(format!(
                "Expected '{}', got {}",
                expected,
                describe(&self.current)
            )))
        }
    }

    /// Parse a complete matrix literal, rejecting trailing input
    pub fn parse_matrix(&mut self) -> SystolicResult<Matrix> {
        if !self.started {
            self.started = true;
            self.advance()?;
        }

        let wrapped = self.parse_wrapper()?;
        let rows = self.parse_rows()?;
        if wrapped {
            self.expect(Token::RParen)?;
        }
        if self.current.is_some() {
            return Err(SystolicError::parse_error(format!(
                "Unexpected trailing {}",
                describe(&self.current)
            )));
        }

        Matrix::from_rows(rows)
    }

    /// Skip a `np.array(` style prefix, returning whether one was present
    fn parse_wrapper(&mut self) -> SystolicResult<bool> {
        if !matches!(self.current, Some(Token::Ident(_))) {
            return Ok(false);
        }
        self.advance()?;
        while self.check(&Token::Dot) {
            self.advance()?;
            match self.advance()? {
                Some(Token::Ident(_)) => {}
                other => {
                    return Err(SystolicError::parse_error(format!(
                        "Expected identifier after '.', got {}",
                        describe(&other)
                    )))
                }
            }
        }
        self.expect(Token::LParen)?;
        Ok(true)
    }

    /// Parse `[[..], [..]]` or a single `[..]` row
    fn parse_rows(&mut self) -> SystolicResult<Vec<Vec<i64>>> {
        self.expect(Token::LBracket)?;

        if self.check(&Token::RBracket) {
            self.advance()?;
            return Ok(Vec::new());
        }
        if matches!(self.current, Some(Token::Integer(_))) {
            let row = self.parse_values()?;
            return Ok(vec![row]);
        }

        let mut rows = Vec::new();
        loop {
            self.expect(Token::LBracket)?;
            rows.push(self.parse_values()?);

            if self.check(&Token::Comma) {
                self.advance()?;
                // Allow trailing comma
                if self.check(&Token::RBracket) {
                    self.advance()?;
                    break;
                }
            } else {
                self.expect(Token::RBracket)?;
                break;
            }
        }
        Ok(rows)
    }

    /// Parse comma-separated integers up to and including the closing `]`
    fn parse_values(&mut self) -> SystolicResult<Vec<i64>> {
        let mut values = Vec::new();
        loop {
            match &self.current {
                Some(Token::Integer(n)) => {
                    values.push(*n);
                    self.advance()?;
                }
                Some(Token::RBracket) => {
                    self.advance()?;
                    return Ok(values);
                }
                other => {
                    return Err(SystolicError::parse_error(format!(
                        "Expected integer in matrix literal, got {}",
                        describe(other)
                    )))
                }
            }

            if self.check(&Token::Comma) {
                self.advance()?;
            } else {
                self.expect(Token::RBracket)?;
                return Ok(values);
            }
        }
    }
}

fn describe(token: &Option<Token>) -> String {
    match token {
        Some(tok) => format!("'{}'", tok),
        None => "end of input".to_string(),
    }
}
