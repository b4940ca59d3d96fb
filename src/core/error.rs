//! Error types of the simulation kernel.
//!
//! Every fallible public API returns `SimResult<T>`. The variants of
//! `SimulationError` let the caller tell a bad configuration apart from a
//! broken model graph, a failing behavioural unit or a lost stream.

use crate::core::types::Time;
use thiserror::Error;

/// Direction of a port, used in structural error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Violations of the model graph's invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("model '{0}' not found")]
    UnknownModel(String),

    #[error("model '{parent}' already has a child named '{name}'")]
    DuplicateModel { parent: String, name: String },

    #[error("{direction} port '{port}' not found on model '{model}'")]
    UnknownPort {
        model: String,
        port: String,
        direction: PortDirection,
    },

    #[error("model '{model}' is not a child of '{parent}'")]
    NotAChild { model: String, parent: String },

    #[error("no dynamics registered under '{name}' (model '{model}')")]
    UnknownDynamics { model: String, name: String },

    #[error("instantaneous cascade did not terminate at t={time} after {iterations} iterations")]
    InstantaneousCascade { time: Time, iterations: usize },
}

/// Error raised by a behavioural unit.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct DynamicsError {
    pub message: String,
}

impl DynamicsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for DynamicsError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for DynamicsError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Invalid access to a result matrix or a numeric table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("sample at t={time} is older than the last row at t={last}")]
    OutOfOrder { time: Time, last: Time },

    #[error("cell ({column}, {row}) outside table of {width}x{height}")]
    OutOfBounds {
        column: usize,
        row: usize,
        width: usize,
        height: usize,
    },

    #[error("table of {width}x{height} needs {expected} cells, found {found}")]
    BadShape {
        width: usize,
        height: usize,
        expected: usize,
        found: usize,
    },
}

/// Failures of the observation stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode stream message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("frame of {size} bytes exceeds the limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("stream is already closed")]
    Closed,
}

/// The top-level error type of the kernel.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("dynamics of '{model}' failed at t={time}: {source}")]
    Behavioral {
        model: String,
        time: Time,
        #[source]
        source: DynamicsError,
    },

    #[error("observation stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("no configuration loaded")]
    NotLoaded,

    #[error("simulation stopped after a fatal error; finish and load again")]
    NotResumable,
}

impl SimulationError {
    /// Build a configuration error from any message
    pub fn config(message: impl Into<String>) -> Self {
        SimulationError::Config(message.into())
    }

    /// True for structural errors, whatever their cause
    pub fn is_structural(&self) -> bool {
        matches!(self, SimulationError::Structural(_))
    }
}

/// Convenience alias for `Result<T, SimulationError>`.
pub type SimResult<T> = Result<T, SimulationError>;
