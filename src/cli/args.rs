//! CLI argument definitions (clap)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// polyrun - run scripts in any supported language
#[derive(Parser, Debug)]
#[command(name = "polyrun")]
#[command(about = "Resolve and run scripts across interpreters, archives and URLs")]
#[command(long_about = r#"
polyrun picks a runner for each script by file ending, runner name or type
tag, unwrapping URLs, zip/jar/skl archives and bundle folders on the way.

EXAMPLES:
  # Run scripts in order, stopping at the first failure
  polyrun run setup.lua main.py -- --fast

  # Evaluate inline code
  polyrun eval --runner python "print(42)"

  # Show which runner would handle an identifier
  polyrun resolve tools/report.skl

  # List runners and effective configuration as JSON
  polyrun list --json

CONFIGURATION:
  Precedence: CLI flags > .polyrun/config.toml (searched upward from CWD) > defaults
  Use --config to load an explicit file instead.

EXIT STATUS:
  The script's own exit code, or 251-255 for runner-side failures
  (255 failure, 254 not found, 253 unavailable, 252 aborted, 251 timeout).
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Kill a run after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Discard script output
    #[arg(long, global = true)]
    pub silent: bool,

    /// Disable a runner for this invocation (repeatable)
    #[arg(long = "disable", global = true, value_name = "RUNNER")]
    pub disable: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more scripts
    Run {
        /// Script paths, URLs, archives or bundle folders
        #[arg(required = true)]
        scripts: Vec<String>,

        /// Arguments passed to every script
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Evaluate inline code with a named runner
    Eval {
        /// Runner name, e.g. lua or python
        #[arg(long, short)]
        runner: String,

        /// Source code
        code: String,
    },

    /// Print the runner that would handle an identifier
    Resolve { identifier: String },

    /// List registered runners
    List {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_collects_trailing_args() {
        let cli = Cli::try_parse_from(["polyrun", "run", "a.lua", "b.py", "--", "-x", "y"]).unwrap();
        match cli.command {
            Commands::Run { scripts, args } => {
                assert_eq!(scripts, vec!["a.lua", "b.py"]);
                assert_eq!(args, vec!["-x", "y"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "polyrun", "list", "--json", "--disable", "Python", "--timeout", "5",
        ])
        .unwrap();
        assert_eq!(cli.disable, vec!["Python"]);
        assert_eq!(cli.timeout, Some(5));
        assert!(matches!(cli.command, Commands::List { json: true }));
    }
}
