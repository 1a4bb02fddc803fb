//! Token types for the expression lexer.

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 0-based character offset of the first character.
    pub pos: usize,
}

/// The kind of token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Ident(String),
    Number(f64),

    // Arithmetic
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,

    // Delimiters
    LParen,
    RParen,
    Comma,

    // Lexed only so the parser can name them in its error
    Dot,
    Assign,
    Semicolon,

    // Special
    Eof,
}

impl TokenKind {
    /// Human-readable rendering used in error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Number(v) => format!("number {v}"),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::StarStar => "'**'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}
