use std::path::PathBuf;

/// Values supplied on the command line; they override the config file.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file; skips discovery.
    pub config_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub silent: Option<bool>,
    pub verbose: Option<bool>,
    /// Additional runners to disable for this invocation.
    pub disabled_runners: Vec<String>,
}
