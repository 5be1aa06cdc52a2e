use crate::error::ConfigError;

use super::Config;

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.timeout_secs == Some(0) {
            return Err(invalid("timeout_secs", "must be greater than 0"));
        }
        if self.network.probe_timeout_secs == Some(0) {
            return Err(invalid("probe_timeout_secs", "must be greater than 0"));
        }
        if self.network.download_timeout_secs == Some(0) {
            return Err(invalid("download_timeout_secs", "must be greater than 0"));
        }
        if self.lua.abort_check_instructions == Some(0) {
            return Err(invalid("abort_check_instructions", "must be greater than 0"));
        }

        for (name, interpreter) in &self.interpreters {
            if let Some(program) = &interpreter.program
                && program.trim().is_empty()
            {
                return Err(invalid(
                    &format!("interpreters.{name}.program"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Check that every runner named in `[runners]` and `[interpreters]`
    /// exists. Runner names are only known once the registry is built.
    pub fn validate_runner_names(&self, known: &[&str]) -> Result<(), ConfigError> {
        let is_known = |name: &str| known.iter().any(|k| k.eq_ignore_ascii_case(name));

        if let Some(name) = self.runners.disabled.iter().find(|n| !is_known(n)) {
            return Err(ConfigError::UnknownRunner {
                key: "runners.disabled".to_string(),
                name: name.clone(),
            });
        }
        if let Some(name) = self.interpreters.keys().find(|n| !is_known(n)) {
            return Err(ConfigError::UnknownRunner {
                key: "interpreters".to_string(),
                name: name.clone(),
            });
        }
        Ok(())
    }
}
