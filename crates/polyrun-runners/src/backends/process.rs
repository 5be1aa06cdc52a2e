//! Backends that launch an external interpreter per run.
//!
//! [`ProcessBackend`] owns everything process-specific: locating the
//! executable, building the argv, pumping output, timeouts, and killing the
//! whole process tree on abort. An [`Interpreter`] only contributes the
//! language-specific pieces (argument layout, error-location parsing).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;
use polyrun_config::{Config, InterpreterConfig};
use polyrun_process::{CommandSpec, KillHandle, ProcessError, PumpConfig};
use polyrun_utils::OutputSink;
use polyrun_utils::bundle::BundlePaths;
use polyrun_utils::exit_codes::codes;
use tracing::{debug, error, info, warn};

use super::{AbortLatch, RedirectSlot};
use crate::contract::RunnerDescriptor;
use crate::error::BoxError;
use crate::lifecycle::{Backend, log_not_supported};
use crate::options::RunOptions;

/// Environment variable carrying the current bundle folder to child scripts.
pub const BUNDLE_PATH_ENV: &str = "POLYRUN_BUNDLE_PATH";

/// Language-specific part of a process backend.
pub trait Interpreter: Send + Sync + 'static {
    fn descriptor(&self) -> &RunnerDescriptor;

    /// Executable names looked up on `PATH`, in order of preference.
    fn programs(&self) -> &'static [&'static str];

    /// Whether the interpreter exists on this platform at all.
    fn platform_supported(&self) -> bool {
        true
    }

    fn script_args(&self, script: &Path, args: &[String]) -> Vec<String>;

    fn eval_args(&self, source: &str) -> Vec<String>;

    fn interactive_args(&self, args: &[String]) -> Vec<String> {
        args.to_vec()
    }

    fn supports_interactive(&self) -> bool {
        true
    }

    fn env(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// Source line of the failure, or `UNKNOWN_LINE`.
    ///
    /// `script` is set for file runs, `source` for inline code.
    fn error_line(&self, stderr: &str, script: Option<&Path>, source: Option<&str>) -> i32;

    /// Turn a fragment of a larger script into something runnable.
    fn prepare_lines(&self, source: &str) -> String {
        source.to_string()
    }

    fn command_line_help(&self) -> Option<String> {
        None
    }

    fn interactive_help(&self) -> Option<String> {
        None
    }
}

/// A [`Backend`] running scripts through an external interpreter.
///
/// Runs through one backend are serialized; different backends run in
/// parallel.
pub struct ProcessBackend<I: Interpreter> {
    interpreter: I,
    settings: InterpreterConfig,
    bundle: Arc<BundlePaths>,
    program: OnceCell<Option<PathBuf>>,
    exec_lock: Mutex<()>,
    current: Mutex<Option<KillHandle>>,
    abort: AbortLatch,
    redirect: RedirectSlot,
}

/// Where a run came from, for error-line mapping.
enum Origin<'a> {
    Script(&'a Path),
    Inline(&'a str),
}

impl<I: Interpreter> ProcessBackend<I> {
    pub fn new(interpreter: I, config: &Config, bundle: Arc<BundlePaths>) -> Self {
        let settings = config
            .interpreter(interpreter.descriptor().name)
            .cloned()
            .unwrap_or_default();
        Self {
            interpreter,
            settings,
            bundle,
            program: OnceCell::new(),
            exec_lock: Mutex::new(()),
            current: Mutex::new(None),
            abort: AbortLatch::default(),
            redirect: RedirectSlot::default(),
        }
    }

    fn name(&self) -> &'static str {
        self.interpreter.descriptor().name
    }

    fn current(&self) -> MutexGuard<'_, Option<KillHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The executable to launch: the configured override, else the first of
    /// the interpreter's program names found on `PATH`. Looked up once.
    pub fn program(&self) -> Option<&Path> {
        self.program
            .get_or_init(|| {
                if let Some(program) = &self.settings.program {
                    let path = Path::new(program);
                    if path.components().count() > 1 {
                        return path.is_file().then(|| path.to_path_buf());
                    }
                    return which::which(program).ok();
                }
                self.interpreter
                    .programs()
                    .iter()
                    .find_map(|name| which::which(name).ok())
            })
            .as_deref()
    }

    fn command(&self, program: &Path, args: Vec<String>) -> CommandSpec {
        let mut spec = CommandSpec::new(program)
            .args(self.settings.args.iter().cloned())
            .args(args)
            .envs(self.interpreter.env());
        if let Some(bundle) = self.bundle.bundle_path() {
            spec = spec.env(BUNDLE_PATH_ENV, bundle);
        }
        spec
    }

    fn execute(
        &self,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        origin: Origin<'_>,
        options: &mut RunOptions,
    ) -> i32 {
        let Some(program) = self.program() else {
            error!(runner = self.name(), "No interpreter executable available");
            return codes::UNAVAILABLE;
        };
        let _serial = self.exec_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let code = self.execute_locked(program, args, cwd, origin, options);
        self.abort.consume();
        code
    }

    fn execute_locked(
        &self,
        program: &Path,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        origin: Origin<'_>,
        options: &mut RunOptions,
    ) -> i32 {
        let mut spec = self.command(program, args);
        if let Some(cwd) = cwd {
            spec = spec.cwd(cwd);
        }
        let (stdout, stderr) = self.redirect.sinks(options);
        let pump = PumpConfig {
            stdout,
            stderr,
            ..PumpConfig::default()
        };

        let running = match polyrun_process::spawn(&spec, pump) {
            Ok(running) => running,
            Err(e) => return self.spawn_failed(&e),
        };
        let handle = running.kill_handle();
        *self.current() = Some(handle.clone());
        // An abort that arrived before the handle was published.
        if self.abort.is_requested() {
            handle.kill();
        }

        let waited = running.wait(options.timeout);
        self.current().take();
        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(runner = self.name(), error = %e, "Waiting for interpreter failed");
                return codes::FAILURE;
            }
        };

        if outcome.timed_out {
            warn!(runner = self.name(), "Script timed out; process tree killed");
            return codes::TIMEOUT;
        }
        if outcome.killed || self.abort.is_requested() {
            info!(runner = self.name(), "Script aborted");
            return codes::ABORTED;
        }
        match outcome.exit_code {
            Some(codes::SUCCESS) => codes::SUCCESS,
            Some(code) => {
                options.error_line = match origin {
                    Origin::Script(script) => {
                        self.interpreter
                            .error_line(&outcome.stderr_tail, Some(script), None)
                    }
                    Origin::Inline(source) => {
                        self.interpreter
                            .error_line(&outcome.stderr_tail, None, Some(source))
                    }
                };
                info!(
                    runner = self.name(),
                    exit_code = code,
                    error_line = options.error_line,
                    "Script exited with error"
                );
                code
            }
            None => {
                warn!(runner = self.name(), "Interpreter ended by a signal");
                codes::FAILURE
            }
        }
    }

    fn spawn_failed(&self, e: &ProcessError) -> i32 {
        error!(runner = self.name(), error = %e, "Cannot start interpreter");
        if e.is_not_found() {
            codes::UNAVAILABLE
        } else {
            codes::FAILURE
        }
    }
}

impl<I: Interpreter> Backend for ProcessBackend<I> {
    fn descriptor(&self) -> &RunnerDescriptor {
        self.interpreter.descriptor()
    }

    fn is_supported(&self) -> bool {
        self.interpreter.platform_supported() && self.program().is_some()
    }

    fn is_local_file(&self) -> bool {
        true
    }

    fn do_init(&self, _args: &[String]) -> Result<(), BoxError> {
        if !self.interpreter.platform_supported() {
            return Err(format!("{} is not available on this platform", self.name()).into());
        }
        let program = self.program().ok_or_else(|| {
            format!(
                "none of {:?} found on PATH and no [interpreters.{}] program configured",
                self.interpreter.programs(),
                self.name()
            )
        })?;
        debug!(runner = self.name(), program = %program.display(), "Interpreter located");
        Ok(())
    }

    fn do_redirect(&self, out: OutputSink, err: OutputSink) -> bool {
        self.redirect.set(out, err)
    }

    fn do_run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        // The child starts in the script's folder, so a relative path would
        // no longer resolve.
        let path = std::path::absolute(script).unwrap_or_else(|_| PathBuf::from(script));
        let cwd = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf);
        let argv = self.interpreter.script_args(&path, args);
        self.execute(argv, cwd, Origin::Script(&path), options)
    }

    fn do_eval_script(&self, source: &str, options: &mut RunOptions) -> i32 {
        let argv = self.interpreter.eval_args(source);
        self.execute(argv, self.bundle.bundle_path(), Origin::Inline(source), options)
    }

    fn do_run_lines(&self, source: &str, options: &mut RunOptions) {
        let prepared = self.interpreter.prepare_lines(source);
        let argv = self.interpreter.eval_args(&prepared);
        let code = self.execute(
            argv,
            self.bundle.bundle_path(),
            Origin::Inline(&prepared),
            options,
        );
        debug!(runner = self.name(), exit_code = code, "Lines executed");
    }

    fn do_run_interactive(&self, args: &[String]) -> i32 {
        if !self.interpreter.supports_interactive() {
            log_not_supported(self.name(), "run_interactive");
            return codes::FAILURE;
        }
        let Some(program) = self.program() else {
            error!(runner = self.name(), "No interpreter executable available");
            return codes::UNAVAILABLE;
        };
        let spec = self.command(program, self.interpreter.interactive_args(args));
        match polyrun_process::run_interactive(&spec) {
            Ok(Some(code)) => code,
            Ok(None) => codes::FAILURE,
            Err(e) => self.spawn_failed(&e),
        }
    }

    fn is_abort_supported(&self) -> bool {
        true
    }

    fn do_abort(&self) {
        self.abort.request();
        let handle = self.current().clone();
        if let Some(handle) = handle {
            handle.kill();
        }
    }

    fn begin_run(&self) {
        self.abort.begin();
    }

    fn end_run(&self) {
        self.abort.end();
    }

    fn do_close(&self) {
        self.redirect.clear();
    }

    fn command_line_help(&self) -> Option<String> {
        self.interpreter.command_line_help()
    }

    fn interactive_help(&self) -> Option<String> {
        self.interpreter.interactive_help()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backends::lua::{LuaBackend, LuaInterpreter};
    use crate::contract::ScriptRunner;
    use crate::lifecycle::Lifecycle;
    use crate::options::UNKNOWN_LINE;
    use polyrun_utils::test_support::write_script;
    use std::collections::BTreeMap;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    /// `sh` as an interpreter; error lines come from `line N:` in stderr.
    struct Shell;

    const SHELL: RunnerDescriptor = RunnerDescriptor::new("Shell", "text/x-sh", &["sh"]);

    impl Interpreter for Shell {
        fn descriptor(&self) -> &RunnerDescriptor {
            &SHELL
        }

        fn programs(&self) -> &'static [&'static str] {
            &["sh"]
        }

        fn script_args(&self, script: &Path, args: &[String]) -> Vec<String> {
            let mut argv = vec![script.display().to_string()];
            argv.extend_from_slice(args);
            argv
        }

        fn eval_args(&self, source: &str) -> Vec<String> {
            vec!["-c".to_string(), source.to_string()]
        }

        fn error_line(&self, stderr: &str, _script: Option<&Path>, _source: Option<&str>) -> i32 {
            stderr
                .split("line ")
                .nth(1)
                .and_then(|rest| rest.split(':').next())
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(UNKNOWN_LINE)
        }
    }

    fn shell_runner(config: &Config) -> Arc<Lifecycle<ProcessBackend<Shell>>> {
        let bundle = Arc::new(BundlePaths::new());
        Arc::new(Lifecycle::new(
            ProcessBackend::new(Shell, config, Arc::clone(&bundle)),
            bundle,
        ))
    }

    #[test]
    fn test_script_output_and_exit_code() {
        let runner = shell_runner(&Config::default());
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "demo.sh", "echo \"hi $1\"\npwd\nexit 3\n");
        let (out, buffer) = OutputSink::capture();
        let mut options = RunOptions::default().with_out(out).with_err(OutputSink::stderr());
        let code = runner.run_script(
            script.to_str().unwrap(),
            &["there".to_string()],
            &mut options,
        );
        assert_eq!(code, 3);
        let output = buffer.contents();
        assert!(output.starts_with("hi there\n"));
        let cwd = output.lines().nth(1).unwrap();
        assert_eq!(
            polyrun_utils::paths::canonicalize(Path::new(cwd)).unwrap(),
            polyrun_utils::paths::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn test_eval_success_keeps_unknown_line() {
        let runner = shell_runner(&Config::default());
        let mut options = RunOptions::default().silent();
        assert_eq!(runner.eval_script("true", &mut options), codes::SUCCESS);
        assert_eq!(options.error_line, UNKNOWN_LINE);
    }

    #[test]
    fn test_timeout_kills_process() {
        let runner = shell_runner(&Config::default());
        let mut options = RunOptions::default()
            .silent()
            .with_timeout(Duration::from_millis(200));
        assert_eq!(runner.eval_script("sleep 30", &mut options), codes::TIMEOUT);
    }

    fn spawn_eval(
        runner: &Arc<Lifecycle<ProcessBackend<Shell>>>,
        source: &'static str,
        out: Option<OutputSink>,
    ) -> thread::JoinHandle<i32> {
        let runner = Arc::clone(runner);
        thread::spawn(move || {
            let mut options = match out {
                Some(out) => RunOptions::default().with_out(out),
                None => RunOptions::default().silent(),
            };
            runner.eval_script(source, &mut options)
        })
    }

    fn wait_running(runner: &Arc<Lifecycle<ProcessBackend<Shell>>>) {
        while !runner.is_running() {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_abort_kills_process_tree() {
        let runner = shell_runner(&Config::default());
        let worker = spawn_eval(&runner, "sleep 30 & wait", None);
        wait_running(&runner);
        runner.abort();
        assert_eq!(worker.join().unwrap(), codes::ABORTED);

        let mut options = RunOptions::default().silent();
        assert_eq!(runner.eval_script("true", &mut options), codes::SUCCESS);
    }

    #[test]
    fn test_runs_through_one_backend_are_serialized() {
        let runner = shell_runner(&Config::default());
        let (out, buffer) = OutputSink::capture();
        let source = "echo start; sleep 0.2; echo end";
        let workers: Vec<_> = (0..2)
            .map(|_| spawn_eval(&runner, source, Some(out.clone())))
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), codes::SUCCESS);
        }
        assert_eq!(buffer.contents(), "start\nend\nstart\nend\n");
    }

    #[test]
    fn test_different_backends_run_in_parallel() {
        let shell = shell_runner(&Config::default());
        let worker = spawn_eval(&shell, "sleep 30", None);
        wait_running(&shell);

        let other_shell = shell_runner(&Config::default());
        let lua = Lifecycle::new(
            LuaBackend::new(Arc::new(LuaInterpreter::new())),
            Arc::new(BundlePaths::new()),
        );
        let mut options = RunOptions::default().silent();
        assert_eq!(other_shell.eval_script("exit 4", &mut options), 4);
        assert_eq!(lua.eval_script("os.exit(5)", &mut options), 5);
        assert!(!worker.is_finished());

        shell.abort();
        assert_eq!(worker.join().unwrap(), codes::ABORTED);
    }

    #[test]
    fn test_missing_program_override_is_unsupported() {
        let mut interpreters = BTreeMap::new();
        interpreters.insert(
            "Shell".to_string(),
            InterpreterConfig {
                program: Some("/definitely/not/here/sh".to_string()),
                args: Vec::new(),
            },
        );
        let config = Config {
            interpreters,
            ..Config::default()
        };
        let runner = shell_runner(&config);
        assert!(!runner.is_supported());
        assert!(runner.init(&[]).is_err());
        let mut options = RunOptions::default();
        assert_eq!(runner.eval_script("true", &mut options), codes::FAILURE);
    }

    #[test]
    fn test_configured_args_come_first() {
        let mut interpreters = BTreeMap::new();
        interpreters.insert(
            "shell".to_string(),
            InterpreterConfig {
                program: Some("sh".to_string()),
                args: vec!["-e".to_string()],
            },
        );
        let config = Config {
            interpreters,
            ..Config::default()
        };
        let runner = shell_runner(&config);
        let mut options = RunOptions::default().silent();
        assert_eq!(runner.eval_script("false; exit 0", &mut options), 1);
    }
}
