//! Engine-wide error types.

use thiserror::Error;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
///
/// Per-row request failures never surface here; they are written into the
/// dataset as tagged cell values instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid state transition: cannot {action} while {state}")]
    InvalidStateTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Dataset is empty: nothing to process")]
    EmptyDataset,

    #[error("No target column selected")]
    NoTargetColumn,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Gradebook error: {0}")]
    Gradebook(#[from] gradebook::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn transition(action: &'static str, state: &'static str) -> Self {
        Self::InvalidStateTransition { action, state }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
