use polyrun_utils::OutputSink;
use polyrun_utils::exit_codes::codes;
use tracing::error;

use crate::contract::{RunnerDescriptor, ScriptRunner};
use crate::error::RunnerError;
use crate::options::RunOptions;

const DESCRIPTOR: RunnerDescriptor = RunnerDescriptor::new("InvalidRunner", "invalid", &[]);

/// Returned when no runner claims an identifier, so callers never hold a
/// missing runner. Every operation logs and fails.
#[derive(Debug)]
pub struct InvalidRunner {
    identifier: String,
}

impl InvalidRunner {
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    fn fail(&self, operation: &str) {
        error!(
            runner = DESCRIPTOR.name,
            identifier = %self.identifier,
            operation = operation,
            "No valid runner for identifier"
        );
    }
}

impl ScriptRunner for InvalidRunner {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn can_handle(&self, _identifier: &str) -> bool {
        false
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn init(&self, _args: &[String]) -> Result<(), RunnerError> {
        self.fail("init");
        Err(RunnerError::Initialization {
            runner: DESCRIPTOR.name.to_string(),
            source: Box::new(RunnerError::Resolution {
                identifier: self.identifier.clone(),
            }),
        })
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn run_script(&self, _script: &str, _args: &[String], _options: &mut RunOptions) -> i32 {
        self.fail("run_script");
        codes::FAILURE
    }

    fn eval_script(&self, _source: &str, _options: &mut RunOptions) -> i32 {
        self.fail("eval_script");
        codes::FAILURE
    }

    fn run_lines(&self, _source: &str, _options: &mut RunOptions) {
        self.fail("run_lines");
    }

    fn run_interactive(&self, _args: &[String]) -> i32 {
        self.fail("run_interactive");
        codes::FAILURE
    }

    fn redirect(&self, _out: OutputSink, _err: OutputSink) -> bool {
        self.fail("redirect");
        false
    }

    fn is_abort_supported(&self) -> bool {
        false
    }

    fn abort(&self) {
        self.fail("abort");
    }

    fn is_running(&self) -> bool {
        false
    }

    fn close(&self) {}

    fn reset(&self) {}

    fn exec_before(&self, _statements: &[String]) {
        self.fail("exec_before");
    }

    fn exec_after(&self, _statements: &[String]) {
        self.fail("exec_after");
    }

    fn command_line_help(&self) -> Option<String> {
        None
    }

    fn interactive_help(&self) -> Option<String> {
        None
    }
}
