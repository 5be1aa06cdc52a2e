//! AppleScript through `osascript` (macOS only).

use std::path::Path;

use super::process::{Interpreter, ProcessBackend};
use crate::contract::RunnerDescriptor;
use crate::error_line;

pub const DESCRIPTOR: RunnerDescriptor =
    RunnerDescriptor::new("AppleScript", "text/applescript", &["scpt", "applescript"]);

pub type AppleScriptBackend = ProcessBackend<AppleScript>;

#[derive(Debug, Default, Clone, Copy)]
pub struct AppleScript;

impl Interpreter for AppleScript {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn programs(&self) -> &'static [&'static str] {
        &["osascript"]
    }

    fn platform_supported(&self) -> bool {
        cfg!(target_os = "macos")
    }

    fn script_args(&self, script: &Path, args: &[String]) -> Vec<String> {
        let mut argv = vec![script.display().to_string()];
        argv.extend_from_slice(args);
        argv
    }

    fn eval_args(&self, source: &str) -> Vec<String> {
        vec!["-e".to_string(), source.to_string()]
    }

    fn supports_interactive(&self) -> bool {
        false
    }

    /// osascript reports character offsets, so the source text is needed.
    fn error_line(&self, stderr: &str, script: Option<&Path>, source: Option<&str>) -> i32 {
        match (source, script) {
            (Some(source), _) => error_line::applescript(stderr, Some(source)),
            (None, Some(script)) => {
                let text = std::fs::read_to_string(script).ok();
                error_line::applescript(stderr, text.as_deref())
            }
            (None, None) => error_line::applescript(stderr, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_error_line_reads_script() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("t.applescript");
        std::fs::write(&script, "set x to 1\nerror \"boom\"\n").unwrap();
        let stderr = format!("{}:11:23: execution error: boom (-2700)", script.display());
        assert_eq!(AppleScript.error_line(&stderr, Some(&script), None), 2);
        assert!(!AppleScript.supports_interactive());
    }
}
