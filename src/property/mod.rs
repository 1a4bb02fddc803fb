//! Property access: the capability the engine writes through.
//!
//! The engine never knows the host's object model. It hands a path string
//! to a [`Resolver`] and gets back a [`Slot`]: one numeric value it may read
//! and write for the duration of a single invocation.

pub mod path;
pub mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use path::{PathError, PropertyPath, Segment};
pub use store::{Property, PropertyStore, PropertyValue, WriteRecord};

/// Value type of the slot behind a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
}

/// Type and range metadata for a resolved slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotMeta {
    pub kind: ValueKind,
    /// Hard limits the host enforces on writes, if any.
    pub range: Option<(f64, f64)>,
}

/// Why a path did not resolve to exactly one numeric slot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },
    #[error("no property at '{0}'")]
    NotFound(String),
    #[error("'{0}' is an array; add an index such as [0]")]
    NotScalar(String),
    #[error("'{0}' is not an array and cannot be indexed")]
    NotIndexable(String),
    #[error("index {index} out of range for '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Why a resolved slot refused a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    #[error("'{0}' is read-only")]
    ReadOnly(String),
    #[error("'{path}' rejected value {value}")]
    Rejected { path: String, value: f64 },
}

/// One gettable/settable numeric value.
pub trait Slot {
    fn get(&self) -> f64;
    fn set(&mut self, value: f64) -> Result<(), WriteError>;
    fn meta(&self) -> SlotMeta;
}

/// Turns a path into a [`Slot`].
///
/// Implementations are shared between the input and tick threads. A slot
/// is only used within the invocation that resolved it.
pub trait Resolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<Box<dyn Slot + '_>, ResolutionError>;
}
