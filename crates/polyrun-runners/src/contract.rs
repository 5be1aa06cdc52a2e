//! The capability contract every runner exposes.

use polyrun_utils::OutputSink;

use crate::error::RunnerError;
use crate::options::RunOptions;

/// Static identity of a runner: name, type tag and recognized file endings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerDescriptor {
    pub name: &'static str,
    /// MIME-like tag, e.g. `text/python`.
    pub type_tag: &'static str,
    /// Extensions without the dot, lowercase.
    pub extensions: &'static [&'static str],
    /// Extra endings (with the dot) that also mark a script of this kind.
    pub alt_endings: &'static [&'static str],
}

impl RunnerDescriptor {
    #[must_use]
    pub const fn new(
        name: &'static str,
        type_tag: &'static str,
        extensions: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            type_tag,
            extensions,
            alt_endings: &[],
        }
    }

    #[must_use]
    pub const fn with_alt_endings(mut self, alt_endings: &'static [&'static str]) -> Self {
        self.alt_endings = alt_endings;
        self
    }

    /// Extensions prefixed with `.`, followed by the alternate endings.
    #[must_use]
    pub fn file_endings(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| format!(".{ext}"))
            .chain(self.alt_endings.iter().map(|e| e.to_string()))
            .collect()
    }

    /// Case-insensitive extension check; a leading dot is ignored.
    #[must_use]
    pub fn has_extension(&self, ending: &str) -> bool {
        let ending = ending.strip_prefix('.').unwrap_or(ending);
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(ending))
    }

    /// Default identifier match.
    ///
    /// True when the identifier equals the runner name, starts with `name*`
    /// (both case-insensitive), equals the type tag, is one of the extensions,
    /// or ends with one of the file endings (case-insensitive).
    #[must_use]
    pub fn matches(&self, identifier: &str) -> bool {
        if identifier.is_empty() {
            return false;
        }
        let lower = identifier.to_lowercase();
        let name = self.name.to_lowercase();
        lower == name
            || lower.starts_with(&format!("{name}*"))
            || identifier == self.type_tag
            || self.has_extension(identifier)
            || self
                .file_endings()
                .iter()
                .any(|ending| lower.ends_with(&ending.to_lowercase()))
    }
}

/// A backend capable of executing scripts of one kind.
///
/// Implementations are long-lived and shared (`Arc<dyn ScriptRunner>`), so
/// every method takes `&self` and must be safe to call from any thread.
/// Apart from [`init`](Self::init), operations never return errors: failures
/// become exit codes (see `polyrun_utils::exit_codes`) and log events.
pub trait ScriptRunner: Send + Sync {
    fn descriptor(&self) -> &RunnerDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn type_tag(&self) -> &'static str {
        self.descriptor().type_tag
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.descriptor().extensions
    }

    fn file_endings(&self) -> Vec<String> {
        self.descriptor().file_endings()
    }

    fn has_extension(&self, ending: &str) -> bool {
        self.descriptor().has_extension(ending)
    }

    /// Whether this runner claims `identifier`.
    fn can_handle(&self, identifier: &str) -> bool {
        self.descriptor().matches(identifier)
    }

    /// Environment capability probe; unsupported runners are never resolved.
    fn is_supported(&self) -> bool;

    /// One-time warm-up. Repeated and concurrent calls are safe; only the
    /// first successful call does real work.
    fn init(&self, args: &[String]) -> Result<(), RunnerError>;

    fn is_ready(&self) -> bool;

    /// Run a script file. Returns the exit code.
    fn run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32;

    /// Evaluate inline source. Returns the exit code.
    fn eval_script(&self, source: &str, options: &mut RunOptions) -> i32;

    /// Run a fragment of a larger script; the outcome is only logged.
    fn run_lines(&self, source: &str, options: &mut RunOptions);

    /// Start the interpreter's interactive mode on the terminal.
    fn run_interactive(&self, args: &[String]) -> i32;

    /// Wire script output to the given streams. Idempotent: once a redirect
    /// succeeded, later calls return true and change nothing.
    fn redirect(&self, out: OutputSink, err: OutputSink) -> bool;

    fn is_abort_supported(&self) -> bool;

    /// Request cooperative cancellation of the current run.
    fn abort(&self);

    /// Whether a run is in progress.
    fn is_running(&self) -> bool;

    /// Release backend resources and drop the redirect.
    fn close(&self);

    /// `close` followed by a fresh warm-up; failures are logged.
    fn reset(&self);

    /// Statements executed before every subsequent run.
    fn exec_before(&self, statements: &[String]);

    /// Statements executed after every subsequent successful run.
    fn exec_after(&self, statements: &[String]);

    fn command_line_help(&self) -> Option<String>;

    fn interactive_help(&self) -> Option<String>;
}

impl std::fmt::Debug for dyn ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("name", &self.name())
            .field("type", &self.type_tag())
            .finish()
    }
}
