//! midibind: map MIDI controls onto numeric properties.
//!
//! Input samples flow through the [`scheduler::Scheduler`] to every matching
//! [`mapping::Mapping`]. The [`runtime::Runtime`] evaluates the mapping's
//! expression, applies Set or Motor mode, and writes the result through a
//! [`property::Resolver`].

pub mod clock;
pub mod config;
pub mod error;
pub mod expr;
pub mod input;
pub mod mapping;
pub mod midi;
pub mod property;
pub mod runtime;
pub mod scheduler;

pub use error::{Error, Result};
