use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    CliArgs, Config, ConfigSource, Defaults, InterpreterConfig, LuaConfig, NetworkConfig,
    RunnersConfig,
};

/// Directory holding the config file.
pub const CONFIG_DIR: &str = ".polyrun";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    runners: Option<RunnersConfig>,
    interpreters: Option<BTreeMap<String, InterpreterConfig>>,
    network: Option<NetworkConfig>,
    lua: Option<LuaConfig>,
}

/// Overwrite `$target` with `$value` when it is set, recording `$source`.
macro_rules! take {
    ($attr:expr, $source:expr, $key:literal, $target:expr, $value:expr) => {
        if $value.is_some() {
            $target = $value;
            $attr.insert($key.to_string(), $source.clone());
        }
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// Path-driven variant used by tests to avoid depending on the process
    /// working directory.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut config = Config::default();
        let attr = &mut config.source_attribution;
        for key in [
            "timeout_secs",
            "silent",
            "verbose",
            "runners_disabled",
            "probe_timeout_secs",
            "download_timeout_secs",
            "rewrite_github",
            "use_proxy",
            "abort_check_instructions",
        ] {
            attr.insert(key.to_string(), ConfigSource::Defaults);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            debug!(path = %path.display(), "Loaded configuration file");
            config.apply_file(file_config, &ConfigSource::ConfigFile(path.clone()));
            config.config_path = Some(path.clone());
        }

        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: TomlConfig, source: &ConfigSource) {
        let attr = &mut self.source_attribution;

        if let Some(defaults) = file.defaults {
            take!(attr, source, "timeout_secs", self.defaults.timeout_secs, defaults.timeout_secs);
            take!(attr, source, "silent", self.defaults.silent, defaults.silent);
            take!(attr, source, "verbose", self.defaults.verbose, defaults.verbose);
        }

        if let Some(runners) = file.runners
            && !runners.disabled.is_empty()
        {
            self.runners.disabled = runners.disabled;
            attr.insert("runners_disabled".to_string(), source.clone());
        }

        if let Some(interpreters) = file.interpreters {
            for (name, interpreter) in interpreters {
                attr.insert(format!("interpreters.{name}"), source.clone());
                self.interpreters.insert(name, interpreter);
            }
        }

        if let Some(network) = file.network {
            take!(attr, source, "probe_timeout_secs", self.network.probe_timeout_secs, network.probe_timeout_secs);
            take!(attr, source, "download_timeout_secs", self.network.download_timeout_secs, network.download_timeout_secs);
            take!(attr, source, "rewrite_github", self.network.rewrite_github, network.rewrite_github);
            take!(attr, source, "use_proxy", self.network.use_proxy, network.use_proxy);
        }

        if let Some(lua) = file.lua {
            take!(attr, source, "abort_check_instructions", self.lua.abort_check_instructions, lua.abort_check_instructions);
        }
    }

    fn apply_cli(&mut self, cli_args: &CliArgs) {
        let attr = &mut self.source_attribution;
        let source = ConfigSource::Cli;

        take!(attr, source, "timeout_secs", self.defaults.timeout_secs, cli_args.timeout_secs);
        take!(attr, source, "silent", self.defaults.silent, cli_args.silent);
        take!(attr, source, "verbose", self.defaults.verbose, cli_args.verbose);

        if !cli_args.disabled_runners.is_empty() {
            for name in &cli_args.disabled_runners {
                if !self.is_runner_disabled(name) {
                    self.runners.disabled.push(name.clone());
                }
            }
            self.source_attribution
                .insert("runners_disabled".to_string(), ConfigSource::Cli);
        }
    }

    /// Search upward from `start_dir` for `.polyrun/config.toml`.
    ///
    /// Stops at repository root markers (.git, .hg, .svn) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = start_dir;

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                return None;
            }

            current_dir = current_dir.parent()?;
        }
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: TomlConfig = toml::from_str(&content).with_context(|| {
                    format!("Failed to parse TOML config file: {}", path.display())
                })?;
                Ok(config)
            }
            // An explicit path that does not exist falls back to defaults
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }

    /// Built-in defaults plus programmatic overrides, without touching the filesystem.
    #[must_use]
    pub fn programmatic(defaults: Defaults) -> Self {
        let mut source_attribution = HashMap::new();
        for (key, set) in [
            ("timeout_secs", defaults.timeout_secs.is_some()),
            ("silent", defaults.silent.is_some()),
            ("verbose", defaults.verbose.is_some()),
        ] {
            let source = if set {
                ConfigSource::Programmatic
            } else {
                ConfigSource::Defaults
            };
            source_attribution.insert(key.to_string(), source);
        }
        Self {
            defaults,
            source_attribution,
            ..Self::default()
        }
    }
}
