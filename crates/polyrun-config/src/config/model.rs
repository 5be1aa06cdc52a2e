use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for the reachability probe of a remote script candidate.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default timeout for downloading a remote script.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Default number of Lua VM instructions between abort checks.
pub const DEFAULT_ABORT_CHECK_INSTRUCTIONS: u32 = 1000;

/// Source of a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Programmatic,
    Defaults,
}

impl ConfigSource {
    /// Stable lowercase label used in `polyrun list` output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::ConfigFile(_) => "config",
            Self::Programmatic => "programmatic",
            Self::Defaults => "default",
        }
    }
}

/// Run defaults applied when a call does not specify them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub timeout_secs: Option<u64>,
    pub silent: Option<bool>,
    pub verbose: Option<bool>,
}

/// `[runners]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunnersConfig {
    /// Runner names that stay registered but are never resolved.
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// `[interpreters.<runner>]`: executable override for a process backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InterpreterConfig {
    pub program: Option<String>,
    /// Extra arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,
}

/// `[network]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub probe_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    /// Rewrite GitHub `tree` URLs to raw content URLs.
    pub rewrite_github: Option<bool>,
    pub use_proxy: Option<bool>,
}

impl NetworkConfig {
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(
            self.download_timeout_secs
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn rewrite_github(&self) -> bool {
        self.rewrite_github.unwrap_or(true)
    }

    #[must_use]
    pub fn use_proxy(&self) -> bool {
        self.use_proxy.unwrap_or(true)
    }
}

/// `[lua]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LuaConfig {
    pub abort_check_instructions: Option<u32>,
}

impl LuaConfig {
    #[must_use]
    pub fn abort_check_instructions(&self) -> u32 {
        self.abort_check_instructions
            .unwrap_or(DEFAULT_ABORT_CHECK_INSTRUCTIONS)
    }
}

/// Configuration for polyrun.
///
/// Use [`Config::discover`] for CLI behavior (search `.polyrun/config.toml`
/// upward from the working directory) or [`Config::default`] for a fully
/// built-in configuration in tests and embedding.
///
/// # Example
///
/// ```rust,no_run
/// use polyrun_config::{CliArgs, Config};
///
/// let config = Config::discover(&CliArgs::default())?;
/// println!("Timeout: {:?}", config.run_timeout());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub defaults: Defaults,
    pub runners: RunnersConfig,
    pub interpreters: BTreeMap<String, InterpreterConfig>,
    pub network: NetworkConfig,
    pub lua: LuaConfig,
    /// Which layer set each key.
    pub source_attribution: HashMap<String, ConfigSource>,
    /// The file that was loaded, if any.
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Per-run timeout, if configured.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.defaults.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn silent(&self) -> bool {
        self.defaults.silent.unwrap_or(false)
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.defaults.verbose.unwrap_or(false)
    }

    /// Whether the named runner is disabled (case-insensitive).
    #[must_use]
    pub fn is_runner_disabled(&self, name: &str) -> bool {
        self.runners
            .disabled
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Interpreter override for the named runner (case-insensitive).
    #[must_use]
    pub fn interpreter(&self, name: &str) -> Option<&InterpreterConfig> {
        self.interpreters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}
