//! Resolved expression tree.
//!
//! The parser produces these nodes directly: every name has already been
//! looked up in the whitelist, so evaluation never meets an unknown symbol.

use std::f64::consts::PI;

/// A variable supplied by the evaluation environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    /// Normalized controller input.
    X,
    /// Scene time in seconds.
    Time,
    /// Scene frame number.
    Frame,
}

/// Single-operand operations: negation plus the unary whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Tan,
    Abs,
    Round,
    Sqrt,
}

/// Two-operand operations: arithmetic plus the binary whitelist.
///
/// `**` and `pow(a, b)` both lower to [`BinaryOp::Pow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

/// A node of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Var(Variable),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Whether any `time` or `frame` reference occurs in the tree.
    pub fn references_clock(&self) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Var(v) => matches!(v, Variable::Time | Variable::Frame),
            Expr::Unary(_, operand) => operand.references_clock(),
            Expr::Binary(_, lhs, rhs) => lhs.references_clock() || rhs.references_clock(),
        }
    }
}

/// A whitelisted function and the operation it lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl Builtin {
    pub fn arity(self) -> usize {
        match self {
            Builtin::Unary(_) => 1,
            Builtin::Binary(_) => 2,
        }
    }
}

/// What a bare identifier may refer to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol {
    Variable(Variable),
    Constant(f64),
    Function(Builtin),
}

const SYMBOLS: &[(&str, Symbol)] = &[
    ("x", Symbol::Variable(Variable::X)),
    ("time", Symbol::Variable(Variable::Time)),
    ("frame", Symbol::Variable(Variable::Frame)),
    ("pi", Symbol::Constant(PI)),
    ("sin", Symbol::Function(Builtin::Unary(UnaryOp::Sin))),
    ("cos", Symbol::Function(Builtin::Unary(UnaryOp::Cos))),
    ("tan", Symbol::Function(Builtin::Unary(UnaryOp::Tan))),
    ("abs", Symbol::Function(Builtin::Unary(UnaryOp::Abs))),
    ("round", Symbol::Function(Builtin::Unary(UnaryOp::Round))),
    ("sqrt", Symbol::Function(Builtin::Unary(UnaryOp::Sqrt))),
    ("min", Symbol::Function(Builtin::Binary(BinaryOp::Min))),
    ("max", Symbol::Function(Builtin::Binary(BinaryOp::Max))),
    ("pow", Symbol::Function(Builtin::Binary(BinaryOp::Pow))),
];

/// Look up a name in the fixed symbol table.
pub fn lookup(name: &str) -> Option<Symbol> {
    SYMBOLS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, symbol)| *symbol)
}

/// Every name an expression may use, in table order.
pub fn symbol_names() -> impl Iterator<Item = &'static str> {
    SYMBOLS.iter().map(|(n, _)| *n)
}
