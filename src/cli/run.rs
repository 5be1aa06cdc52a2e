//! CLI entry point and dispatch
//!
//! `run()` parses arguments, discovers the configuration, installs logging,
//! builds the runner registry and dispatches. It prints every error itself;
//! main.rs only turns the returned code into the process status.

use clap::Parser;
use polyrun_utils::logging::init_tracing;
use tracing::debug;

use super::args::Cli;
use super::commands;
use crate::{CliArgs, Config, ExitCode, RunnerRegistry, codes};

pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        timeout_secs: cli.timeout,
        silent: cli.silent.then_some(true),
        verbose: cli.verbose.then_some(true),
        disabled_runners: cli.disable.clone(),
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration error: {err:#}");
            return Err(ExitCode::FAILURE);
        }
    };

    if let Err(e) = init_tracing(config.verbose()) {
        eprintln!("✗ Failed to initialize logging: {e}");
    }

    let registry = RunnerRegistry::with_defaults(config);
    if let Err(err) = registry.config().validate_runner_names(&registry.names()) {
        eprintln!("✗ Configuration error: {err}");
        return Err(ExitCode::FAILURE);
    }

    debug!(command = ?cli.command, config = ?registry.config().config_path, "Dispatching");
    let result = commands::execute(&registry, cli.command);
    registry.close_all();

    match result {
        Ok(codes::SUCCESS) => Ok(()),
        Ok(code) => Err(ExitCode::from_i32(code)),
        Err(err) => {
            eprintln!("✗ {err:#}");
            Err(ExitCode::FAILURE)
        }
    }
}
