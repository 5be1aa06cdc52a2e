//! Configuration for polyrun.
//!
//! Values come from three layers with precedence CLI > `.polyrun/config.toml`
//! > built-in defaults, and every key remembers which layer set it.

mod config;
pub mod error;

pub use config::*;
pub use error::ConfigError;
