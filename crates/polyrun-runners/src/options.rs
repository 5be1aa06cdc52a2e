use polyrun_utils::OutputSink;
use std::time::Duration;

/// Error line value meaning "location unknown".
pub const UNKNOWN_LINE: i32 = -1;

/// Options bag passed to every run/eval call.
///
/// The callee writes the mapped failure location into
/// [`error_line`](Self::error_line); it stays [`UNKNOWN_LINE`] when the run
/// succeeded or the interpreter's error text carried no location.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Destination for script stdout. Falls back to the redirected stream,
    /// then to the process stdout.
    pub out: Option<OutputSink>,
    /// Destination for script stderr, with the same fallbacks.
    pub err: Option<OutputSink>,
    /// Do not pump script output anywhere.
    pub silent: bool,
    /// Out-parameter: source line of the failure.
    pub error_line: i32,
    /// Caller is an editor shell that manages the bundle path itself.
    pub running_in_ide: bool,
    /// Kill the run after this long.
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            out: None,
            err: None,
            silent: false,
            error_line: UNKNOWN_LINE,
            running_in_ide: false,
            timeout: None,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn with_out(mut self, out: OutputSink) -> Self {
        self.out = Some(out);
        self
    }

    #[must_use]
    pub fn with_err(mut self, err: OutputSink) -> Self {
        self.err = Some(err);
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn in_ide(mut self) -> Self {
        self.running_in_ide = true;
        self
    }
}
