//! polyrun - run scripts in any supported language through one registry
//!
//! A [`RunnerRegistry`] holds one runner per script kind (Lua, Python,
//! JavaScript, ...) plus location adapters that unwrap URLs, archives and
//! bundle folders. Resolving an identifier yields the first runner that
//! claims it; running returns a plain exit code (see [`codes`]).
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Run a script, forwarding arguments after `--`
//! polyrun run scripts/login.lua -- --user demo
//!
//! # Evaluate inline code with a named runner
//! polyrun eval --runner lua 'print(6 * 7)'
//!
//! # Which runner would handle this?
//! polyrun resolve https://example.com/scripts/demo
//!
//! # Registered runners and effective configuration
//! polyrun list --json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use polyrun::{Config, RunOptions, RunnerRegistry, codes};
//!
//! let registry = RunnerRegistry::with_defaults(Config::default());
//! let mut options = RunOptions::default();
//! let code = registry.run("demo.lua", &[], &mut options);
//! assert_eq!(code, codes::SUCCESS);
//! ```

pub mod cli;

pub use polyrun_config::{CliArgs, Config, ConfigError};
pub use polyrun_runners::{
    Backend, InvalidRunner, Lifecycle, RegistryBuilder, RunOptions, RunnerDescriptor, RunnerError,
    RunnerInfo, RunnerRegistry, ScriptRunner, UNKNOWN_LINE,
};
pub use polyrun_utils::OutputSink;
pub use polyrun_utils::exit_codes::{ExitCode, codes};
