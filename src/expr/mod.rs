//! Expression compiler and evaluator for mapping math.
//!
//! Source text goes through lexer → parser → resolved tree. The grammar is
//! arithmetic only: decimal literals, `x`, `time`, `frame`, `pi`,
//! `+ - * / **`, parentheses, and calls to `sin cos tan abs round sqrt`
//! (one argument) or `min max pow` (two arguments). Everything else is a
//! [`CompileError`].

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod token;

use std::fmt;

pub use ast::Expr;
pub use error::{CompileError, ErrorKind, EvalError};
pub use eval::Env;

use ast::Variable;
use lexer::Lexer;
use parser::Parser;

/// An immutable, validated expression ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    root: Expr,
    time_varying: bool,
}

impl CompiledExpression {
    /// The identity expression `x`.
    pub fn identity() -> Self {
        Self {
            source: String::new(),
            root: Expr::Var(Variable::X),
            time_varying: false,
        }
    }

    /// Evaluate against the given variable bindings.
    pub fn evaluate(&self, env: &Env) -> Result<f64, EvalError> {
        eval::eval(&self.root, env)
    }

    /// Source text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Whether the value can change with `time` or `frame` alone.
    pub fn is_time_varying(&self) -> bool {
        self.time_varying
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.trim().is_empty() {
            write!(f, "x")
        } else {
            write!(f, "{}", self.source.trim())
        }
    }
}

/// The expression compiler.
pub struct Compiler;

impl Compiler {
    /// Parse and validate an expression.
    ///
    /// Empty or whitespace-only source compiles to the identity `x`.
    pub fn compile(source: &str) -> Result<CompiledExpression, CompileError> {
        if source.trim().is_empty() {
            return Ok(CompiledExpression {
                source: source.to_string(),
                ..CompiledExpression::identity()
            });
        }

        let tokens = Lexer::new(source).tokenize()?;
        let root = Parser::new(tokens).parse()?;
        let time_varying = root.references_clock();

        Ok(CompiledExpression {
            source: source.to_string(),
            root,
            time_varying,
        })
    }
}

/// Convenience wrapper around [`Compiler::compile`].
pub fn compile(source: &str) -> Result<CompiledExpression, CompileError> {
    Compiler::compile(source)
}
