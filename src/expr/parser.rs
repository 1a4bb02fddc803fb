//! Parser for mapping expressions.
//!
//! Recursive descent over the token stream, producing a resolved [`Expr`].
//! Precedence, loosest first: `+ -`, `* /`, unary `+ -`, `**`
//! (right-associative, so `-2**2` is `-(2**2)` and `2**-1` is `2**(-1)`).

use super::ast::{lookup, BinaryOp, Builtin, Expr, Symbol, UnaryOp};
use super::error::CompileError;
use super::token::{Token, TokenKind};

/// Nesting limit for parentheses, unary chains and calls.
const MAX_DEPTH: usize = 64;

/// Height limit of the finished tree. Evaluation and drop both recurse once
/// per level, so flat operator chains count against this too.
pub const MAX_HEIGHT: usize = 256;

/// A subtree together with its height.
struct Node {
    expr: Expr,
    height: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Self { expr, height: 1 }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse a complete expression; the whole token stream must be consumed.
    pub fn parse(&mut self) -> Result<Expr, CompileError> {
        let node = self.parse_additive()?;

        let t = self.peek();
        match &t.kind {
            TokenKind::Eof => Ok(node.expr),
            TokenKind::Assign => Err(CompileError::parse("assignment is not allowed", t.pos)),
            TokenKind::Semicolon => Err(CompileError::parse("statements are not allowed", t.pos)),
            other => Err(CompileError::parse(
                format!("unexpected {} after expression", other.describe()),
                t.pos,
            )),
        }
    }

    fn parse_additive(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs, pos)?;
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs, pos)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node, CompileError> {
        let pos = self.peek().pos;
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                self.enter(pos)?;
                let operand = self.parse_unary()?;
                self.leave();
                unary(UnaryOp::Neg, operand, pos)
            }
            TokenKind::Plus => {
                self.advance();
                self.enter(pos)?;
                let operand = self.parse_unary()?;
                self.leave();
                Ok(operand)
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Node, CompileError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::StarStar) {
            let pos = self.advance().pos;
            self.enter(pos)?;
            let exponent = self.parse_unary()?;
            self.leave();
            return binary(BinaryOp::Pow, base, exponent, pos);
        }
        Ok(base)
    }

    /// A primary followed by anything that would make it a non-arithmetic
    /// construct: attribute access or calling a non-function.
    fn parse_postfix(&mut self) -> Result<Node, CompileError> {
        let node = self.parse_primary()?;
        let t = self.peek();
        match t.kind {
            TokenKind::Dot => Err(CompileError::parse(
                "attribute access is not allowed",
                t.pos,
            )),
            TokenKind::LParen => Err(CompileError::parse(
                "only whitelisted functions can be called",
                t.pos,
            )),
            _ => Ok(node),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, CompileError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::Number(v) => {
                self.advance();
                Ok(Node::leaf(Expr::Const(v)))
            }
            TokenKind::Ident(ref name) => {
                self.advance();
                self.parse_identifier(name, t.pos)
            }
            TokenKind::LParen => {
                self.advance();
                self.enter(t.pos)?;
                let inner = self.parse_additive()?;
                self.leave();
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(CompileError::parse("unexpected end of expression", t.pos)),
            ref other => Err(CompileError::parse(
                format!("expected a number, name or '(', got {}", other.describe()),
                t.pos,
            )),
        }
    }

    fn parse_identifier(&mut self, name: &str, pos: usize) -> Result<Node, CompileError> {
        let is_call = self.check(&TokenKind::LParen);
        match lookup(name) {
            None if is_call => Err(CompileError::validate(
                format!("unknown function '{name}'"),
                pos,
            )),
            None => Err(CompileError::validate(
                format!("unknown identifier '{name}'"),
                pos,
            )),
            Some(Symbol::Function(builtin)) if is_call => self.parse_call(name, builtin, pos),
            Some(Symbol::Function(_)) => Err(CompileError::validate(
                format!("function '{name}' must be called"),
                pos,
            )),
            Some(_) if is_call => Err(CompileError::validate(
                format!("'{name}' is not a function"),
                pos,
            )),
            Some(Symbol::Variable(v)) => Ok(Node::leaf(Expr::Var(v))),
            Some(Symbol::Constant(c)) => Ok(Node::leaf(Expr::Const(c))),
        }
    }

    fn parse_call(
        &mut self,
        name: &str,
        builtin: Builtin,
        pos: usize,
    ) -> Result<Node, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        self.enter(pos)?;

        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_additive()?);
                if self.check(&TokenKind::Assign) {
                    return Err(CompileError::parse(
                        "keyword arguments are not allowed",
                        self.peek().pos,
                    ));
                }
                if self.check(&TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.leave();

        if args.len() != builtin.arity() {
            let plural = if builtin.arity() == 1 { "" } else { "s" };
            return Err(CompileError::validate(
                format!(
                    "{name}() takes {} argument{plural}, got {}",
                    builtin.arity(),
                    args.len()
                ),
                pos,
            ));
        }

        let mut args = args.into_iter();
        match (builtin, args.next(), args.next()) {
            (Builtin::Unary(op), Some(a), None) => unary(op, a, pos),
            (Builtin::Binary(op), Some(a), Some(b)) => binary(op, a, b, pos),
            _ => Err(CompileError::validate(
                format!("{name}() called with the wrong number of arguments"),
                pos,
            )),
        }
    }

    // --- Utility methods ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&Token, CompileError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let t = self.peek();
            Err(CompileError::parse(
                format!("expected {what}, got {}", t.kind.describe()),
                t.pos,
            ))
        }
    }

    fn enter(&mut self, pos: usize) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CompileError::parse("expression nests too deeply", pos));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

fn unary(op: UnaryOp, operand: Node, pos: usize) -> Result<Node, CompileError> {
    let height = grow(operand.height, pos)?;
    Ok(Node {
        expr: Expr::unary(op, operand.expr),
        height,
    })
}

fn binary(op: BinaryOp, lhs: Node, rhs: Node, pos: usize) -> Result<Node, CompileError> {
    let height = grow(lhs.height.max(rhs.height), pos)?;
    Ok(Node {
        expr: Expr::binary(op, lhs.expr, rhs.expr),
        height,
    })
}

fn grow(child: usize, pos: usize) -> Result<usize, CompileError> {
    let height = child + 1;
    if height > MAX_HEIGHT {
        return Err(CompileError::parse("expression is too long or nests too deeply", pos));
    }
    Ok(height)
}
