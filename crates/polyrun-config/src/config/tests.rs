use super::*;
use crate::error::ConfigError;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let config_dir = dir.join(".polyrun");
    fs::create_dir_all(&config_dir).unwrap();
    let path = config_dir.join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_defaults_without_config_file() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();

    let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
    assert!(config.config_path.is_none());
    assert_eq!(config.run_timeout(), None);
    assert!(!config.silent());
    assert_eq!(config.network.probe_timeout(), Duration::from_secs(5));
    assert!(config.network.rewrite_github());
    assert_eq!(config.lua.abort_check_instructions(), 1000);
    assert_eq!(
        config.source_attribution.get("silent"),
        Some(&ConfigSource::Defaults)
    );
}

#[test]
fn test_config_file_discovered_upward() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();
    let path = write_config(
        temp.path(),
        r#"
[defaults]
timeout_secs = 30
silent = true

[runners]
disabled = ["AppleScript"]

[interpreters.Python]
program = "/usr/bin/python3.12"
args = ["-X", "utf8"]

[network]
probe_timeout_secs = 2
rewrite_github = false

[lua]
abort_check_instructions = 250
"#,
    );
    let nested = temp.path().join("a/b/c");
    fs::create_dir_all(&nested).unwrap();

    let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
    assert!(config.silent());
    assert!(config.is_runner_disabled("applescript"));
    let python = config.interpreter("python").unwrap();
    assert_eq!(python.program.as_deref(), Some("/usr/bin/python3.12"));
    assert_eq!(python.args, vec!["-X".to_string(), "utf8".to_string()]);
    assert_eq!(config.network.probe_timeout(), Duration::from_secs(2));
    assert!(!config.network.rewrite_github());
    assert_eq!(config.lua.abort_check_instructions(), 250);
    assert_eq!(
        config.source_attribution.get("timeout_secs"),
        Some(&ConfigSource::ConfigFile(path))
    );
}

#[test]
fn test_discovery_stops_at_repository_root() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[defaults]\nsilent = true\n");
    let repo = temp.path().join("repo");
    fs::create_dir_all(repo.join(".git")).unwrap();

    assert!(Config::discover_config_file_from(&repo).is_none());
}

#[test]
fn test_cli_overrides_file() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();
    write_config(
        temp.path(),
        "[defaults]\ntimeout_secs = 30\n[runners]\ndisabled = [\"Text\"]\n",
    );

    let cli = CliArgs {
        timeout_secs: Some(5),
        disabled_runners: vec!["Python".to_string(), "text".to_string()],
        ..CliArgs::default()
    };
    let config = Config::discover_from(temp.path(), &cli).unwrap();
    assert_eq!(config.run_timeout(), Some(Duration::from_secs(5)));
    assert_eq!(
        config.source_attribution.get("timeout_secs"),
        Some(&ConfigSource::Cli)
    );
    assert_eq!(config.runners.disabled, vec!["Text", "Python"]);

    let effective = config.effective_config();
    assert_eq!(
        effective.get("timeout_secs"),
        Some(&("5".to_string(), "cli".to_string()))
    );
}

#[test]
fn test_explicit_missing_path_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let cli = CliArgs {
        config_path: Some(temp.path().join("missing.toml")),
        ..CliArgs::default()
    };
    let config = Config::discover_from(temp.path(), &cli).unwrap();
    assert_eq!(config.run_timeout(), None);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();
    write_config(temp.path(), "[defaults\ntimeout_secs = ");
    let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
    assert!(err.to_string().contains("Failed to load config file"));
}

#[test]
fn test_unknown_section_is_rejected() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();
    write_config(temp.path(), "[runner]\nmode = \"native\"\n");
    assert!(Config::discover_from(temp.path(), &CliArgs::default()).is_err());
}

#[test]
fn test_zero_timeout_rejected() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();
    write_config(temp.path(), "[defaults]\ntimeout_secs = 0\n");
    let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
    let config_err = err.downcast_ref::<ConfigError>().unwrap();
    assert!(matches!(config_err, ConfigError::InvalidValue { key, .. } if key == "timeout_secs"));
}

#[test]
fn test_empty_program_rejected() {
    let mut config = Config::default();
    config.interpreters.insert(
        "Python".to_string(),
        InterpreterConfig {
            program: Some("  ".to_string()),
            args: Vec::new(),
        },
    );
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidValue { .. })
    ));
}

#[test]
fn test_validate_runner_names() {
    let mut config = Config::default();
    config.runners.disabled.push("Cobol".to_string());
    let err = config
        .validate_runner_names(&["Lua", "Python"])
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRunner { name, .. } if name == "Cobol"));

    config.runners.disabled = vec!["python".to_string()];
    assert!(config.validate_runner_names(&["Lua", "Python"]).is_ok());
}

#[test]
fn test_programmatic_attribution() {
    let config = Config::programmatic(Defaults {
        silent: Some(true),
        ..Defaults::default()
    });
    assert!(config.silent());
    assert_eq!(
        config.source_attribution.get("silent"),
        Some(&ConfigSource::Programmatic)
    );
    assert_eq!(
        config.source_attribution.get("timeout_secs"),
        Some(&ConfigSource::Defaults)
    );
}
