use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown runner '{name}' in {key}")]
    UnknownRunner { key: String, name: String },
}
