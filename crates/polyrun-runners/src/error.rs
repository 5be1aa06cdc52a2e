//! Error types for the runner subsystem

use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runner errors.
///
/// Only [`RunnerError::Initialization`] ever reaches a caller as an error
/// value; every other failure is logged and converted to an exit code at the
/// lifecycle boundary.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Cannot initialize script runner {runner}: {source}")]
    Initialization {
        runner: String,
        #[source]
        source: BoxError,
    },

    #[error("{runner} does not (yet) support {operation}")]
    NotSupported {
        runner: String,
        operation: &'static str,
    },

    #[error("No runner can handle '{identifier}'")]
    Resolution { identifier: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error in {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },
}

impl RunnerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
