//! Lexer for matrix literals using logos
//!
//! Supports tokens like:
//! - Integers: 1, -3, 42
//! - Punctuation: [, ], (, ), ,, .
//! - Identifiers, so a NumPy-style `np.array([[1, 2], [3, 4]])` wrapper is accepted

use logos::Logos;

/// Token types for matrix literals
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\n\r]+|#[^\n]*)")] // Skip whitespace and comments
pub enum Token {
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
        }
    }
}

/// Lexer wrapper that provides a stream of tokens
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Byte range of the most recently lexed token
    pub fn span(&self) -> std::ops::Range<usize> {
        self.inner.span()
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<Token, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_literal() {
        let source = "[[1, -2], [3, 4]]";
        let tokens: Vec<_> = Lexer::new(source).filter_map(Result::ok).collect();
        assert_eq!(tokens, vec![
            Token::LBracket,
            Token::LBracket,
            Token::Integer(1),
            Token::Comma,
            Token::Integer(-2),
            Token::RBracket,
            Token::Comma,
            Token::LBracket,
            Token::Integer(3),
            Token::Comma,
            Token::Integer(4),
            Token::RBracket,
            Token::RBracket,
        ]);
    }

    #[test]
    fn test_numpy_wrapper() {
        let source = "np.array([[7]])";
        let tokens: Vec<_> = Lexer::new(source).filter_map(Result::ok).collect();
        assert_eq!(tokens, vec![
            Token::Ident("np".to_string()),
            Token::Dot,
            Token::Ident("array".to_string()),
            Token::LParen,
            Token::LBracket,
            Token::LBracket,
            Token::Integer(7),
            Token::RBracket,
            Token::RBracket,
            Token::RParen,
        ]);
    }

    #[test]
    fn test_comments_skipped() {
        let source = "# weights\n[[1]]";
        let tokens: Vec<_> = Lexer::new(source).filter_map(Result::ok).collect();
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn test_invalid_character() {
        let mut lexer = Lexer::new("[1; 2]");
        assert_eq!(lexer.next(), Some(Ok(Token::LBracket)));
        assert_eq!(lexer.next(), Some(Ok(Token::Integer(1))));
        assert_eq!(lexer.next(), Some(Err(())));
        assert_eq!(lexer.span(), 2..3);
    }

    #[test]
    fn test_span_tracks_last_token() {
        let mut lexer = Lexer::new("[ 55");
        assert_eq!(lexer.next(), Some(Ok(Token::LBracket)));
        assert_eq!(lexer.next(), Some(Ok(Token::Integer(55))));
        assert_eq!(lexer.span(), 2..4);
        assert_eq!(lexer.next(), None);
    }
}
