//! Command implementations

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::args::Commands;
use crate::{Config, ExitCode, RunOptions, RunnerInfo, RunnerRegistry, UNKNOWN_LINE, codes};

pub(super) fn execute(registry: &RunnerRegistry, command: Commands) -> Result<i32> {
    match command {
        Commands::Run { scripts, args } => Ok(run_scripts(registry, &scripts, &args)),
        Commands::Eval { runner, code } => Ok(eval(registry, &runner, &code)),
        Commands::Resolve { identifier } => Ok(resolve(registry, &identifier)),
        Commands::List { json } => list(registry, json),
    }
}

fn run_options(config: &Config) -> RunOptions {
    let mut options = RunOptions::default();
    if config.silent() {
        options = options.silent();
    }
    if let Some(timeout) = config.run_timeout() {
        options = options.with_timeout(timeout);
    }
    options
}

fn report(code: i32, options: &RunOptions) {
    if code == codes::SUCCESS {
        return;
    }
    let code = ExitCode::from_i32(code);
    if options.error_line == UNKNOWN_LINE {
        eprintln!("✗ Exit {code}");
    } else {
        eprintln!("✗ Exit {code}, error at line {}", options.error_line);
    }
}

fn run_scripts(registry: &RunnerRegistry, scripts: &[String], args: &[String]) -> i32 {
    let mut options = run_options(registry.config());
    let code = registry.run_scripts(scripts, args, &mut options);
    report(code, &options);
    code
}

fn eval(registry: &RunnerRegistry, runner: &str, source: &str) -> i32 {
    let mut options = run_options(registry.config());
    let code = registry
        .runner_by_name(runner)
        .eval_script(source, &mut options);
    report(code, &options);
    code
}

fn resolve(registry: &RunnerRegistry, identifier: &str) -> i32 {
    match registry.find_runner(identifier) {
        Some(runner) => {
            println!("{}\t{}", runner.name(), runner.type_tag());
            codes::SUCCESS
        }
        None => {
            eprintln!("✗ No runner can handle '{identifier}'");
            codes::FAILURE
        }
    }
}

fn state(info: &RunnerInfo) -> &'static str {
    match (info.supported, info.disabled) {
        (_, true) => "disabled",
        (false, false) => "unsupported",
        (true, false) => "active",
    }
}

fn format_runners(runners: &[RunnerInfo]) -> String {
    let mut out = format!("{:<14} {:<26} {:<18} {}\n", "RUNNER", "TYPE", "EXTENSIONS", "STATE");
    for info in runners {
        let extensions = if info.extensions.is_empty() {
            "-".to_string()
        } else {
            info.extensions.join(", ")
        };
        out.push_str(&format!(
            "{:<14} {:<26} {:<18} {}\n",
            info.name,
            info.type_tag,
            extensions,
            state(info)
        ));
    }
    out
}

#[derive(Serialize)]
struct ConfigValue {
    value: String,
    source: String,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    runners: Vec<RunnerInfo>,
    config_file: Option<&'a Path>,
    config: BTreeMap<String, ConfigValue>,
}

fn list(registry: &RunnerRegistry, json: bool) -> Result<i32> {
    let config = registry.config();
    let effective = config.effective_config();

    if json {
        let output = ListOutput {
            runners: registry.describe(),
            config_file: config.config_path.as_deref(),
            config: effective
                .into_iter()
                .map(|(key, (value, source))| (key, ConfigValue { value, source }))
                .collect(),
        };
        let text = serde_json::to_string_pretty(&output).context("Failed to serialize runner list")?;
        println!("{text}");
        return Ok(codes::SUCCESS);
    }

    print!("{}", format_runners(&registry.describe()));
    println!();
    match &config.config_path {
        Some(path) => println!("Configuration ({}):", path.display()),
        None => println!("Configuration (built-in defaults):"),
    }
    for (key, (value, source)) in effective {
        println!("  {key} = {value} [{source}]");
    }
    Ok(codes::SUCCESS)
}
