//! Command-line interface for polyrun
//!
//! - `args`: clap definitions
//! - `run`: entry point, configuration and dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
