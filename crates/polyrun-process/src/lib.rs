//! Child process execution for the process-backed script runners.
//!
//! All launches go through [`CommandSpec`], so interpreter arguments are
//! passed as discrete argv elements and never through a shell. A
//! [`RunningProcess`] pumps the child's stdout/stderr on background threads
//! into [`OutputSink`](polyrun_utils::OutputSink)s, keeps a bounded stderr
//! tail for error-line mapping, and can be terminated together with its
//! descendants through a [`KillHandle`].

pub mod command_spec;
pub mod error;
pub mod process;
pub mod tree;

pub use command_spec::CommandSpec;
pub use error::ProcessError;
pub use process::{ProcessOutcome, PumpConfig, RunningProcess, run_interactive, spawn};
pub use tree::KillHandle;
