//! Error types for expression compilation and evaluation.

use thiserror::Error;

/// An error that occurred while compiling an expression.
///
/// `position` is the 0-based character offset into the source where the
/// problem was detected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("at {position}: {kind:?}: {reason}")]
pub struct CompileError {
    pub reason: String,
    pub position: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Character-level problem (stray symbol, string quote, bad number).
    Lex,
    /// Structural problem (missing paren, assignment, trailing input).
    Parse,
    /// Well-formed but not allowed (unknown name, wrong arity).
    Validate,
}

impl CompileError {
    pub fn lex(reason: impl Into<String>, position: usize) -> Self {
        Self {
            reason: reason.into(),
            position,
            kind: ErrorKind::Lex,
        }
    }

    pub fn parse(reason: impl Into<String>, position: usize) -> Self {
        Self {
            reason: reason.into(),
            position,
            kind: ErrorKind::Parse,
        }
    }

    pub fn validate(reason: impl Into<String>, position: usize) -> Self {
        Self {
            reason: reason.into(),
            position,
            kind: ErrorKind::Validate,
        }
    }
}

/// A runtime arithmetic fault. Never caused by a missing symbol: those are
/// rejected at compile time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("numeric domain error: {0}")]
    NumericDomain(&'static str),
}
