use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> &'static str {
    source.unwrap_or(&ConfigSource::Defaults).label()
}

impl Config {
    /// Effective configuration as `key -> (value, source)`.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add_config = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            config.insert(key.to_string(), (value, source.to_string()));
        };

        if let Some(timeout) = self.defaults.timeout_secs {
            add_config("timeout_secs", timeout.to_string());
        }
        add_config("silent", self.silent().to_string());
        add_config("verbose", self.verbose().to_string());
        add_config("runners_disabled", self.runners.disabled.join(", "));
        add_config(
            "probe_timeout_secs",
            self.network.probe_timeout().as_secs().to_string(),
        );
        add_config(
            "download_timeout_secs",
            self.network.download_timeout().as_secs().to_string(),
        );
        add_config("rewrite_github", self.network.rewrite_github().to_string());
        add_config("use_proxy", self.network.use_proxy().to_string());
        add_config(
            "abort_check_instructions",
            self.lua.abort_check_instructions().to_string(),
        );

        for (name, interpreter) in &self.interpreters {
            if let Some(program) = &interpreter.program {
                let key = format!("interpreters.{name}");
                let source = source_label(self.source_attribution.get(&key));
                config.insert(key, (program.clone(), source.to_string()));
            }
        }

        config
    }
}
