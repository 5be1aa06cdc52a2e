//! Error types for child process execution

use thiserror::Error;

/// Failures while launching, waiting on or terminating an interpreter process.
///
/// A non-zero exit, a timeout or a kill are not errors; they are reported in
/// [`ProcessOutcome`](crate::ProcessOutcome).
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process tree setup failed: {reason}")]
    TreeSetup { reason: String },
}

impl ProcessError {
    /// True when the interpreter executable itself could not be found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
