use std::path::PathBuf;

use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

/// Errors raised by the simulation core. None of them are retried.
#[derive(Error, Debug)]
pub enum SimError {
    /// Malformed batch, record, config file or simulation parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Field shape/extent mismatch or an invalid diagnostics window.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt data in {}: {reason}", .path.display())]
    CorruptData { path: PathBuf, reason: String },

    #[error("display error: {0}")]
    Display(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SimError::CorruptData { path: path.into(), reason: reason.into() }
    }

    /// Map an I/O error on `path`, turning `NotFound` into the typed variant.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SimError::NotFound(path.into())
        } else {
            SimError::Io(err)
        }
    }
}
