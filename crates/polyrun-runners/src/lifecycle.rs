//! Shared runner state machine.
//!
//! [`Lifecycle`] owns the `ready`/`redirected` flags and the dispatch of every
//! contract operation to a [`Backend`]'s hooks. A backend only says how to
//! execute; the lifecycle guarantees one-time init, idempotent redirect,
//! bundle-path scoping for local files, and that a panicking hook becomes an
//! exit code instead of unwinding into the caller.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use polyrun_utils::OutputSink;
use polyrun_utils::bundle::{BundlePaths, BundleScope};
use polyrun_utils::exit_codes::codes;
use polyrun_utils::logging::{RunTimer, run_span};
use tracing::{debug, error, info, warn};

use crate::contract::{RunnerDescriptor, ScriptRunner};
use crate::error::{BoxError, RunnerError};
use crate::location::looks_like_url;
use crate::options::RunOptions;

/// Log that `runner` has no implementation for `operation`.
pub(crate) fn log_not_supported(runner: &str, operation: &'static str) {
    let err = RunnerError::NotSupported {
        runner: runner.to_string(),
        operation,
    };
    warn!(runner = %runner, "{err}");
}

/// Backend-specific hooks driven by [`Lifecycle`].
///
/// Every hook has a default that logs "not supported" and reports failure, so
/// a backend implements only what its interpreter can do.
pub trait Backend: Send + Sync + 'static {
    fn descriptor(&self) -> &RunnerDescriptor;

    fn is_supported(&self) -> bool;

    /// Scripts are local files: the lifecycle checks they exist and scopes
    /// the bundle path to their folder.
    fn is_local_file(&self) -> bool {
        false
    }

    fn can_handle(&self, identifier: &str) -> bool {
        if self.is_local_file() && looks_like_url(identifier) {
            return false;
        }
        self.descriptor().matches(identifier)
    }

    fn do_init(&self, _args: &[String]) -> Result<(), BoxError> {
        Ok(())
    }

    fn do_redirect(&self, _out: OutputSink, _err: OutputSink) -> bool {
        false
    }

    fn do_run_script(&self, _script: &str, _args: &[String], _options: &mut RunOptions) -> i32 {
        log_not_supported(self.descriptor().name, "run_script");
        codes::FAILURE
    }

    fn do_eval_script(&self, _source: &str, _options: &mut RunOptions) -> i32 {
        log_not_supported(self.descriptor().name, "eval_script");
        codes::FAILURE
    }

    fn do_run_lines(&self, _source: &str, _options: &mut RunOptions) {
        log_not_supported(self.descriptor().name, "run_lines");
    }

    fn do_run_interactive(&self, _args: &[String]) -> i32 {
        log_not_supported(self.descriptor().name, "run_interactive");
        codes::FAILURE
    }

    fn is_abort_supported(&self) -> bool {
        false
    }

    fn do_abort(&self) {}

    /// A run is about to start; called before the runner reports running.
    fn begin_run(&self) {}

    /// Paired with [`Backend::begin_run`] on every exit path.
    fn end_run(&self) {}

    fn do_close(&self) {}

    fn do_exec_before(&self, _statements: &[String]) {
        log_not_supported(self.descriptor().name, "exec_before");
    }

    fn do_exec_after(&self, _statements: &[String]) {
        log_not_supported(self.descriptor().name, "exec_after");
    }

    fn command_line_help(&self) -> Option<String> {
        log_not_supported(self.descriptor().name, "command_line_help");
        None
    }

    fn interactive_help(&self) -> Option<String> {
        log_not_supported(self.descriptor().name, "interactive_help");
        None
    }
}

/// Brackets a run with the backend's begin/end hooks and keeps the running
/// counter in step on every exit path.
struct RunningGuard<'a, B: Backend> {
    counter: &'a AtomicUsize,
    backend: &'a B,
}

impl<'a, B: Backend> RunningGuard<'a, B> {
    fn enter(counter: &'a AtomicUsize, backend: &'a B) -> Self {
        backend.begin_run();
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter, backend }
    }
}

impl<B: Backend> Drop for RunningGuard<'_, B> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.backend.end_run();
    }
}

/// A [`ScriptRunner`] built from a [`Backend`].
///
/// States: `UNINITIALIZED -> READY` through a successful `init`, and
/// independently `NOT_REDIRECTED -> REDIRECTED` through a successful
/// `redirect`. `close` resets only the redirect.
pub struct Lifecycle<B: Backend> {
    backend: B,
    state_lock: Mutex<()>,
    ready: AtomicBool,
    redirected: AtomicBool,
    running: AtomicUsize,
    bundle: Arc<BundlePaths>,
}

impl<B: Backend> Lifecycle<B> {
    pub fn new(backend: B, bundle: Arc<BundlePaths>) -> Self {
        Self {
            backend,
            state_lock: Mutex::new(()),
            ready: AtomicBool::new(false),
            redirected: AtomicBool::new(false),
            running: AtomicUsize::new(0),
            bundle,
        }
    }

    /// Wrap into the shared trait object the registry stores.
    pub fn shared(backend: B, bundle: Arc<BundlePaths>) -> Arc<dyn ScriptRunner> {
        Arc::new(Self::new(backend, bundle))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn name(&self) -> &'static str {
        self.backend.descriptor().name
    }

    /// Ensure READY, logging instead of returning the error.
    fn ensure_ready(&self) -> bool {
        match self.init(&[]) {
            Ok(()) => true,
            Err(e) => {
                error!(runner = self.name(), error = %e, "Runner not ready");
                false
            }
        }
    }

    /// Run `hook`, turning a panic into `FAILURE`.
    fn guarded(&self, operation: &str, hook: impl FnOnce() -> i32) -> i32 {
        match catch_unwind(AssertUnwindSafe(hook)) {
            Ok(code) => code,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(runner = self.name(), operation = operation, panic = %message, "Backend panicked");
                codes::FAILURE
            }
        }
    }
}

impl<B: Backend> ScriptRunner for Lifecycle<B> {
    fn descriptor(&self) -> &RunnerDescriptor {
        self.backend.descriptor()
    }

    fn can_handle(&self, identifier: &str) -> bool {
        self.backend.can_handle(identifier)
    }

    fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    fn init(&self, args: &[String]) -> Result<(), RunnerError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let _state = self.state_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend
            .do_init(args)
            .map_err(|source| RunnerError::Initialization {
                runner: self.name().to_string(),
                source,
            })?;
        self.ready.store(true, Ordering::Release);
        debug!(runner = self.name(), "Runner initialized");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        if !self.ensure_ready() {
            return codes::FAILURE;
        }
        let span = run_span(self.name(), script);
        let _entered = span.enter();

        let local = self.backend.is_local_file();
        if local && !Path::new(script).exists() {
            error!(runner = self.name(), script = %script, "Script not found");
            return codes::FILE_NOT_FOUND;
        }

        let _running = RunningGuard::enter(&self.running, &self.backend);
        let _bundle = (local && !options.running_in_ide)
            .then(|| BundleScope::for_script(Arc::clone(&self.bundle), Path::new(script)));

        let timer = RunTimer::start(self.name());
        let code = self.guarded("run_script", || {
            self.backend.do_run_script(script, args, options)
        });
        timer.finish(code)
    }

    fn eval_script(&self, source: &str, options: &mut RunOptions) -> i32 {
        if !self.ensure_ready() {
            return codes::FAILURE;
        }
        let _running = RunningGuard::enter(&self.running, &self.backend);
        let timer = RunTimer::start(self.name());
        let code = self.guarded("eval_script", || self.backend.do_eval_script(source, options));
        timer.finish(code)
    }

    fn run_lines(&self, source: &str, options: &mut RunOptions) {
        if !self.ensure_ready() {
            return;
        }
        let _running = RunningGuard::enter(&self.running, &self.backend);
        self.guarded("run_lines", || {
            self.backend.do_run_lines(source, options);
            codes::SUCCESS
        });
    }

    fn run_interactive(&self, args: &[String]) -> i32 {
        if !self.ensure_ready() {
            return codes::FAILURE;
        }
        let _running = RunningGuard::enter(&self.running, &self.backend);
        self.guarded("run_interactive", || self.backend.do_run_interactive(args))
    }

    fn redirect(&self, out: OutputSink, err: OutputSink) -> bool {
        if self.redirected.load(Ordering::Acquire) {
            return true;
        }
        if !self.ensure_ready() {
            return false;
        }
        let _state = self.state_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.redirected.load(Ordering::Acquire) {
            return true;
        }
        let wired = self.backend.do_redirect(out, err);
        if wired {
            self.redirected.store(true, Ordering::Release);
            debug!(runner = self.name(), "Output redirected");
        }
        wired
    }

    fn is_abort_supported(&self) -> bool {
        self.backend.is_abort_supported()
    }

    fn abort(&self) {
        if self.backend.is_abort_supported() {
            info!(runner = self.name(), "Abort requested");
            self.backend.do_abort();
        } else {
            log_not_supported(self.name(), "abort");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) > 0
    }

    fn close(&self) {
        let _state = self.state_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.backend.do_close();
        self.redirected.store(false, Ordering::Release);
        debug!(runner = self.name(), "Runner closed");
    }

    fn reset(&self) {
        self.close();
        let _state = self.state_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.backend.do_init(&[]) {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                info!(runner = self.name(), "Runner reset");
            }
            Err(e) => {
                error!(runner = self.name(), error = %e, "Runner reset failed; restart before running more scripts");
            }
        }
    }

    fn exec_before(&self, statements: &[String]) {
        self.backend.do_exec_before(statements);
    }

    fn exec_after(&self, statements: &[String]) {
        self.backend.do_exec_after(statements);
    }

    fn command_line_help(&self) -> Option<String> {
        self.backend.command_line_help()
    }

    fn interactive_help(&self) -> Option<String> {
        self.backend.interactive_help()
    }
}
