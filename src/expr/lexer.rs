//! Lexer for mapping expressions.
//!
//! Converts source text into a stream of [`Token`]s. Anything that cannot
//! appear in an arithmetic expression (quotes, comparison and bitwise
//! operators, `%`) is rejected here with a pointed message.

use super::error::CompileError;
use super::token::{Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos: self.pos,
                });
                break;
            }

            let ch = self.peek();
            let token = match ch {
                '+' => self.single_char(TokenKind::Plus),
                '-' => self.single_char(TokenKind::Minus),
                '/' if self.peek_next() == Some('/') => {
                    return Err(CompileError::lex(
                        "floor division '//' is not allowed",
                        self.pos,
                    ));
                }
                '/' => self.single_char(TokenKind::Slash),
                '*' if self.peek_next() == Some('*') => {
                    let pos = self.pos;
                    self.advance();
                    self.advance();
                    Token {
                        kind: TokenKind::StarStar,
                        pos,
                    }
                }
                '*' => self.single_char(TokenKind::Star),
                '(' => self.single_char(TokenKind::LParen),
                ')' => self.single_char(TokenKind::RParen),
                ',' => self.single_char(TokenKind::Comma),
                ';' => self.single_char(TokenKind::Semicolon),
                '[' | ']' => {
                    return Err(CompileError::lex(
                        "subscript access is not allowed",
                        self.pos,
                    ));
                }
                '=' if self.peek_next() == Some('=') => {
                    return Err(CompileError::lex(
                        "comparison operators are not allowed",
                        self.pos,
                    ));
                }
                '=' => self.single_char(TokenKind::Assign),
                '<' | '>' | '!' => {
                    return Err(CompileError::lex(
                        "comparison operators are not allowed",
                        self.pos,
                    ));
                }
                '&' | '|' | '^' | '~' => {
                    return Err(CompileError::lex(
                        format!("bitwise operator '{ch}' is not allowed"),
                        self.pos,
                    ));
                }
                '%' | '@' => {
                    return Err(CompileError::lex(
                        format!("operator '{ch}' is not allowed"),
                        self.pos,
                    ));
                }
                '"' | '\'' => {
                    return Err(CompileError::lex(
                        "string literals are not allowed",
                        self.pos,
                    ));
                }
                '.' if self.peek_next().is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number()?
                }
                '.' => self.single_char(TokenKind::Dot),
                '0'..='9' => self.lex_number()?,
                'a'..='z' | 'A'..='Z' | '_' => self.lex_ident(),
                _ => {
                    return Err(CompileError::lex(
                        format!("unexpected character: '{ch}'"),
                        self.pos,
                    ));
                }
            };

            tokens.push(token);
        }

        Ok(tokens)
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.pos];
        self.pos += 1;
        ch
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn single_char(&mut self, kind: TokenKind) -> Token {
        let pos = self.pos;
        self.advance();
        Token { kind, pos }
    }

    fn consume_digits(&mut self, s: &mut String) {
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            s.push(self.advance());
        }
    }

    /// Decimal literal: `12`, `1.5`, `.5`, `1.`, `2e-3`.
    fn lex_number(&mut self) -> Result<Token, CompileError> {
        let pos = self.pos;
        let mut s = String::new();

        self.consume_digits(&mut s);

        if !self.is_at_end() && self.peek() == '.' {
            s.push(self.advance());
            self.consume_digits(&mut s);
        }

        if !self.is_at_end() && matches!(self.peek(), 'e' | 'E') {
            let exp_ok = match self.peek_next() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self
                    .chars
                    .get(self.pos + 2)
                    .is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if exp_ok {
                s.push(self.advance()); // 'e'
                if matches!(self.peek(), '+' | '-') {
                    s.push(self.advance());
                }
                self.consume_digits(&mut s);
            }
        }

        // `2x`, `0x1f`: a literal running straight into a name.
        if !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            return Err(CompileError::lex(
                format!("invalid number literal starting with '{s}'"),
                pos,
            ));
        }

        let val: f64 = s
            .parse()
            .map_err(|_| CompileError::lex(format!("invalid number: {s}"), pos))?;

        Ok(Token {
            kind: TokenKind::Number(val),
            pos,
        })
    }

    fn lex_ident(&mut self) -> Token {
        let pos = self.pos;
        let mut s = String::new();

        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            s.push(self.advance());
        }

        Token {
            kind: TokenKind::Ident(s),
            pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_arithmetic() {
        assert_eq!(
            kinds("x * 2 + 1"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Star,
                TokenKind::Number(2.0),
                TokenKind::Plus,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_power_operator() {
        assert_eq!(
            kinds("x**2"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::StarStar,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_number_forms() {
        assert_eq!(kinds(".5")[0], TokenKind::Number(0.5));
        assert_eq!(kinds("1.")[0], TokenKind::Number(1.0));
        assert_eq!(kinds("2.25")[0], TokenKind::Number(2.25));
        assert_eq!(kinds("1e3")[0], TokenKind::Number(1000.0));
        assert_eq!(kinds("5E-1")[0], TokenKind::Number(0.5));
    }

    #[test]
    fn lex_positions_are_char_offsets() {
        let tokens = Lexer::new("  sin(x)").tokenize().unwrap();
        assert_eq!(tokens[0].pos, 2);
        assert_eq!(tokens[1].pos, 5);
        assert_eq!(tokens[2].pos, 6);
    }

    #[test]
    fn lex_rejects_strings() {
        let err = Lexer::new("x + 'a'").tokenize().unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.reason.contains("string"));
    }

    #[test]
    fn lex_rejects_comparison() {
        assert!(Lexer::new("x == 1").tokenize().is_err());
        assert!(Lexer::new("x < 1").tokenize().is_err());
        assert!(Lexer::new("not x != 1").tokenize().is_err());
    }

    #[test]
    fn lex_rejects_modulo_and_bitwise() {
        assert!(Lexer::new("x % 2").tokenize().is_err());
        assert!(Lexer::new("x ^ 2").tokenize().is_err());
        assert!(Lexer::new("x // 2").tokenize().is_err());
    }

    #[test]
    fn lex_rejects_number_glued_to_name() {
        assert!(Lexer::new("2x").tokenize().is_err());
        assert!(Lexer::new("0x1f").tokenize().is_err());
    }

    #[test]
    fn lex_keeps_forbidden_punctuation_for_parser() {
        let k = kinds("a.b = 1;");
        assert!(k.contains(&TokenKind::Dot));
        assert!(k.contains(&TokenKind::Assign));
        assert!(k.contains(&TokenKind::Semicolon));
    }

    #[test]
    fn lex_rejects_subscript() {
        let err = Lexer::new("x[0]").tokenize().unwrap_err();
        assert_eq!(err.position, 1);
        assert!(err.reason.contains("subscript"));
    }

    #[test]
    fn lex_unexpected_character() {
        let err = Lexer::new("x $ 1").tokenize().unwrap_err();
        assert_eq!(err.position, 2);
    }
}
