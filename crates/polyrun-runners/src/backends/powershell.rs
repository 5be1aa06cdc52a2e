//! PowerShell through `pwsh`/`powershell.exe` (Windows only).

use std::path::Path;

use super::process::{Interpreter, ProcessBackend};
use crate::contract::RunnerDescriptor;
use crate::error_line;

pub const DESCRIPTOR: RunnerDescriptor =
    RunnerDescriptor::new("PowerShell", "text/powershell", &["ps1"]);

pub type PowerShellBackend = ProcessBackend<PowerShell>;

const COMMON_ARGS: [&str; 4] = ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass"];

#[derive(Debug, Default, Clone, Copy)]
pub struct PowerShell;

impl Interpreter for PowerShell {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn programs(&self) -> &'static [&'static str] {
        &["pwsh", "powershell"]
    }

    fn platform_supported(&self) -> bool {
        cfg!(windows)
    }

    fn script_args(&self, script: &Path, args: &[String]) -> Vec<String> {
        let mut argv: Vec<String> = COMMON_ARGS.iter().map(|a| a.to_string()).collect();
        argv.push("-File".to_string());
        argv.push(script.display().to_string());
        argv.extend_from_slice(args);
        argv
    }

    fn eval_args(&self, source: &str) -> Vec<String> {
        let mut argv: Vec<String> = COMMON_ARGS.iter().map(|a| a.to_string()).collect();
        argv.push("-Command".to_string());
        argv.push(source.to_string());
        argv
    }

    fn interactive_args(&self, args: &[String]) -> Vec<String> {
        let mut argv = vec!["-NoProfile".to_string()];
        argv.extend_from_slice(args);
        argv
    }

    fn error_line(&self, stderr: &str, _script: Option<&Path>, _source: Option<&str>) -> i32 {
        error_line::powershell(stderr)
    }
}
