//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::expr::{CompileError, EvalError};
use crate::mapping::RegistryError;
use crate::property::{ResolutionError, WriteError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("MIDI: {0}")]
    Midi(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
