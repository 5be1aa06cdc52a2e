//! JavaScript through an external `node` process.

use std::path::Path;

use super::process::{Interpreter, ProcessBackend};
use crate::contract::RunnerDescriptor;
use crate::error_line;

pub const DESCRIPTOR: RunnerDescriptor =
    RunnerDescriptor::new("JavaScript", "text/javascript", &["js"]);

pub type JavaScriptBackend = ProcessBackend<JavaScript>;

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScript;

impl Interpreter for JavaScript {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn programs(&self) -> &'static [&'static str] {
        &["node", "nodejs"]
    }

    fn script_args(&self, script: &Path, args: &[String]) -> Vec<String> {
        let mut argv = vec![script.display().to_string()];
        argv.extend_from_slice(args);
        argv
    }

    fn eval_args(&self, source: &str) -> Vec<String> {
        vec!["-e".to_string(), source.to_string()]
    }

    fn error_line(&self, stderr: &str, script: Option<&Path>, _source: Option<&str>) -> i32 {
        error_line::javascript(stderr, script)
    }

    fn command_line_help(&self) -> Option<String> {
        Some("JavaScript files (.js) run with node; arguments are in process.argv.slice(2).".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ScriptRunner;
    use crate::lifecycle::{Backend, Lifecycle};
    use crate::options::RunOptions;
    use polyrun_config::Config;
    use polyrun_utils::bundle::BundlePaths;
    use polyrun_utils::exit_codes::codes;
    use polyrun_utils::test_support::{process_tests_enabled, write_script};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_argv_layout() {
        let argv = JavaScript.script_args(Path::new("demo.js"), &["x".to_string()]);
        assert_eq!(argv, vec!["demo.js", "x"]);
        assert_eq!(JavaScript.eval_args("1"), vec!["-e", "1"]);
    }

    #[test]
    fn test_thrown_error_maps_line() {
        if !process_tests_enabled() {
            return;
        }
        let bundle = Arc::new(BundlePaths::new());
        let backend = ProcessBackend::new(JavaScript, &Config::default(), Arc::clone(&bundle));
        if !backend.is_supported() {
            return;
        }
        let runner = Lifecycle::new(backend, bundle);
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "demo.js", "const a = 1;\nthrow new Error('x');\n");
        let mut options = RunOptions::default().silent();
        let code = runner.run_script(script.to_str().unwrap(), &[], &mut options);
        assert_eq!(code, codes::SCRIPT_ERROR);
        assert_eq!(options.error_line, 2);
    }
}
