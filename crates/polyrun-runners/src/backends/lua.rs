//! Embedded Lua 5.4 backend.
//!
//! There is one VM per [`LuaInterpreter`], and the registry shares a single
//! process-wide interpreter between every Lua runner it builds. Runs are
//! serialized by the VM lock. Abort and timeout are cooperative: an
//! instruction-count hook checks the abort flag and the deadline every
//! `abort_check_instructions` instructions and raises an interrupt error that
//! unwinds the script.

use std::fmt;
use std::path::Path;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use mlua::{Function, HookTriggers, Lua, Table, Value, Variadic, VmState};
use once_cell::sync::Lazy;
use polyrun_config::DEFAULT_ABORT_CHECK_INSTRUCTIONS;
use polyrun_utils::OutputSink;
use polyrun_utils::exit_codes::codes;
use tracing::{debug, info, warn};

use super::{AbortLatch, RedirectSlot};
use crate::contract::RunnerDescriptor;
use crate::error::BoxError;
use crate::error_line;
use crate::lifecycle::Backend;
use crate::options::RunOptions;

pub const DESCRIPTOR: RunnerDescriptor = RunnerDescriptor::new("Lua", "text/lua", &["lua"]);

const EVAL_CHUNK: &str = "[eval]";
const LINES_CHUNK: &str = "[lines]";

static SHARED: Lazy<Arc<LuaInterpreter>> = Lazy::new(|| Arc::new(LuaInterpreter::new()));

/// Raised from Rust into a running script to stop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Exit(i32),
    Aborted,
    TimedOut,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(code) => write!(f, "SystemExit: {code}"),
            Self::Aborted => f.write_str("script aborted"),
            Self::TimedOut => f.write_str("script timed out"),
        }
    }
}

impl std::error::Error for Interrupt {}

fn interrupt_of(err: &mlua::Error) -> Option<Interrupt> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<Interrupt>().copied(),
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            interrupt_of(cause)
        }
        _ => None,
    }
}

/// How a Lua run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LuaOutcome {
    Completed,
    Exit(i32),
    Aborted,
    TimedOut,
    Failed(String),
}

/// One unit of work for the VM.
pub(crate) struct LuaJob<'a> {
    pub source: &'a str,
    /// Chunk name as Lua reports it in messages, without the `@`/`=` marker.
    pub chunk: &'a str,
    pub script: Option<&'a Path>,
    pub args: &'a [String],
    pub out: Option<OutputSink>,
    pub timeout: Option<Duration>,
}

/// A lazily created Lua VM plus the state its hooks share.
pub struct LuaInterpreter {
    vm: Mutex<Option<Lua>>,
    abort: AbortLatch,
    check_interval: AtomicU32,
    print_sink: Arc<Mutex<Option<OutputSink>>>,
    before: Mutex<Vec<String>>,
    after: Mutex<Vec<String>>,
}

impl Default for LuaInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl LuaInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vm: Mutex::new(None),
            abort: AbortLatch::default(),
            check_interval: AtomicU32::new(DEFAULT_ABORT_CHECK_INSTRUCTIONS),
            print_sink: Arc::new(Mutex::new(None)),
            before: Mutex::new(Vec::new()),
            after: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide interpreter.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    pub fn set_check_interval(&self, instructions: u32) {
        self.check_interval
            .store(instructions.max(1), Ordering::Relaxed);
    }

    fn vm(&self) -> MutexGuard<'_, Option<Lua>> {
        self.vm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the VM if it does not exist yet.
    pub fn ensure_started(&self) -> Result<(), mlua::Error> {
        let mut vm = self.vm();
        if vm.is_none() {
            *vm = Some(self.create_vm()?);
            debug!(runner = DESCRIPTOR.name, "Lua VM created");
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.vm().is_some()
    }

    /// Drop the VM; the next run creates a fresh one.
    pub fn close(&self) {
        if self.vm().take().is_some() {
            debug!(runner = DESCRIPTOR.name, "Lua VM closed");
        }
    }

    pub fn request_abort(&self) {
        self.abort.request();
    }

    pub(crate) fn begin_run(&self) {
        self.abort.begin();
    }

    pub(crate) fn end_run(&self) {
        self.abort.end();
    }

    pub fn set_exec_before(&self, statements: &[String]) {
        *self.before.lock().unwrap_or_else(PoisonError::into_inner) = statements.to_vec();
    }

    pub fn set_exec_after(&self, statements: &[String]) {
        *self.after.lock().unwrap_or_else(PoisonError::into_inner) = statements.to_vec();
    }

    fn create_vm(&self) -> Result<Lua, mlua::Error> {
        let lua = Lua::new();
        let globals = lua.globals();

        let sink = Arc::clone(&self.print_sink);
        let print = lua.create_function(move |lua, values: Variadic<Value>| {
            let tostring: Function = lua.globals().get("tostring")?;
            let mut parts = Vec::with_capacity(values.len());
            for value in values {
                parts.push(tostring.call::<String>(value)?);
            }
            let current = sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(sink) = current {
                sink.write_line(&parts.join("\t"))
                    .map_err(mlua::Error::external)?;
            }
            Ok(())
        })?;
        globals.set("print", print)?;

        let exit = lua.create_function(|_, code: Value| -> mlua::Result<()> {
            let code = match code {
                Value::Nil | Value::Boolean(true) => 0,
                Value::Boolean(false) => 1,
                Value::Integer(n) => i32::try_from(n).unwrap_or(1),
                Value::Number(n) => n as i32,
                _ => 1,
            };
            Err(mlua::Error::external(Interrupt::Exit(code)))
        })?;
        let os: Table = globals.get("os")?;
        os.set("exit", exit)?;

        Ok(lua)
    }

    /// Run `job` on the VM, creating it first if needed.
    pub(crate) fn execute(&self, job: LuaJob<'_>) -> LuaOutcome {
        let mut vm = self.vm();
        if vm.is_none() {
            match self.create_vm() {
                Ok(lua) => *vm = Some(lua),
                Err(e) => return LuaOutcome::Failed(e.to_string()),
            }
        }
        let Some(lua) = vm.as_ref() else {
            return LuaOutcome::Failed("Lua VM unavailable".to_string());
        };

        *self.print_sink.lock().unwrap_or_else(PoisonError::into_inner) = job.out.clone();
        let deadline = job.timeout.map(|t| Instant::now() + t);
        self.install_hook(lua, deadline);

        let result = self.run_job(lua, &job);

        lua.remove_hook();
        self.print_sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let outcome = match result {
            Ok(()) => LuaOutcome::Completed,
            Err(e) => match interrupt_of(&e) {
                Some(Interrupt::Exit(code)) => LuaOutcome::Exit(code),
                Some(Interrupt::Aborted) => LuaOutcome::Aborted,
                Some(Interrupt::TimedOut) => LuaOutcome::TimedOut,
                None if self.abort.is_requested() => LuaOutcome::Aborted,
                None if deadline.is_some_and(|d| Instant::now() >= d) => LuaOutcome::TimedOut,
                None => {
                    let message = e.to_string();
                    match error_line::system_exit_code(&message) {
                        Some(code) => LuaOutcome::Exit(code),
                        None => LuaOutcome::Failed(message),
                    }
                }
            },
        };
        self.abort.consume();
        outcome
    }

    fn install_hook(&self, lua: &Lua, deadline: Option<Instant>) {
        let abort = self.abort.flag();
        let interval = self.check_interval.load(Ordering::Relaxed);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(interval),
            move |_lua, _debug| {
                if abort.load(Ordering::SeqCst) {
                    return Err(mlua::Error::external(Interrupt::Aborted));
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(mlua::Error::external(Interrupt::TimedOut));
                }
                Ok(VmState::Continue)
            },
        );
    }

    /// Run `job` with its script folder first on `package.path`. The path and
    /// any module loaded during the run are reset afterwards so the next
    /// script cannot pick them up.
    fn run_job(&self, lua: &Lua, job: &LuaJob<'_>) -> mlua::Result<()> {
        let folder = job
            .script
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty());
        let Some(folder) = folder else {
            return self.run_chunks(lua, job);
        };
        let package: Table = lua.globals().get("package")?;
        let saved_path: String = package.get("path")?;
        let loaded: Table = package.get("loaded")?;
        let preloaded = module_names(&loaded);
        package.set("path", format!("{}/?.lua;{saved_path}", folder.display()))?;

        let result = self.run_chunks(lua, job);

        let restored = package.set("path", saved_path).and_then(|()| {
            module_names(&loaded)
                .difference(&preloaded)
                .try_for_each(|name| loaded.set(name.as_str(), Value::Nil))
        });
        result.and(restored)
    }

    fn run_chunks(&self, lua: &Lua, job: &LuaJob<'_>) -> mlua::Result<()> {
        let before = self
            .before
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .join("\n");
        if !before.is_empty() {
            lua.load(before.as_str()).set_name("=[before]").exec()?;
        }

        let chunk_name = match job.script {
            Some(script) => {
                let arg = lua.create_table()?;
                arg.set(0, script.display().to_string())?;
                for (idx, value) in job.args.iter().enumerate() {
                    arg.set(idx + 1, value.as_str())?;
                }
                lua.globals().set("arg", arg)?;
                format!("@{}", script.display())
            }
            None => format!("={}", job.chunk),
        };

        let args: Variadic<String> = job.args.iter().cloned().collect();
        lua.load(job.source)
            .set_name(chunk_name)
            .call::<()>(args)?;

        let after = self
            .after
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .join("\n");
        if !after.is_empty() {
            lua.load(after.as_str()).set_name("=[after]").exec()?;
        }
        Ok(())
    }
}

fn module_names(loaded: &Table) -> HashSet<String> {
    loaded
        .pairs::<String, Value>()
        .filter_map(|pair| pair.ok().map(|(name, _)| name))
        .collect()
}

/// The Lua runner's backend.
pub struct LuaBackend {
    interpreter: Arc<LuaInterpreter>,
    redirect: RedirectSlot,
}

impl LuaBackend {
    #[must_use]
    pub fn new(interpreter: Arc<LuaInterpreter>) -> Self {
        Self {
            interpreter,
            redirect: RedirectSlot::default(),
        }
    }

    pub fn interpreter(&self) -> &Arc<LuaInterpreter> {
        &self.interpreter
    }

    fn finish(
        &self,
        outcome: LuaOutcome,
        chunk: &str,
        err: Option<OutputSink>,
        options: &mut RunOptions,
    ) -> i32 {
        match outcome {
            LuaOutcome::Completed => codes::SUCCESS,
            LuaOutcome::Exit(code) => {
                debug!(runner = DESCRIPTOR.name, exit_code = code, "Script called os.exit");
                code
            }
            LuaOutcome::Aborted => {
                info!(runner = DESCRIPTOR.name, "Script aborted");
                codes::ABORTED
            }
            LuaOutcome::TimedOut => {
                warn!(runner = DESCRIPTOR.name, "Script timed out");
                codes::TIMEOUT
            }
            LuaOutcome::Failed(message) => {
                options.error_line = error_line::lua(&message, chunk);
                if let Some(err) = err
                    && let Err(e) = err.write_line(&message)
                {
                    debug!(runner = DESCRIPTOR.name, error = %e, "Could not write script error");
                }
                warn!(
                    runner = DESCRIPTOR.name,
                    error_line = options.error_line,
                    error = %message,
                    "Script failed"
                );
                codes::SCRIPT_ERROR
            }
        }
    }
}

impl Backend for LuaBackend {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn is_local_file(&self) -> bool {
        true
    }

    fn do_init(&self, _args: &[String]) -> Result<(), BoxError> {
        self.interpreter.ensure_started()?;
        Ok(())
    }

    fn do_redirect(&self, out: OutputSink, err: OutputSink) -> bool {
        self.redirect.set(out, err)
    }

    fn do_run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        let path = Path::new(script);
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(runner = DESCRIPTOR.name, script = %script, error = %e, "Cannot read script");
                return codes::FAILURE;
            }
        };
        let chunk = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(script);
        let (out, err) = self.redirect.sinks(options);
        let outcome = self.interpreter.execute(LuaJob {
            source: &source,
            chunk,
            script: Some(path),
            args,
            out,
            timeout: options.timeout,
        });
        self.finish(outcome, chunk, err, options)
    }

    fn do_eval_script(&self, source: &str, options: &mut RunOptions) -> i32 {
        let (out, err) = self.redirect.sinks(options);
        let outcome = self.interpreter.execute(LuaJob {
            source,
            chunk: EVAL_CHUNK,
            script: None,
            args: &[],
            out,
            timeout: options.timeout,
        });
        self.finish(outcome, EVAL_CHUNK, err, options)
    }

    fn do_run_lines(&self, source: &str, options: &mut RunOptions) {
        let (out, err) = self.redirect.sinks(options);
        let outcome = self.interpreter.execute(LuaJob {
            source,
            chunk: LINES_CHUNK,
            script: None,
            args: &[],
            out,
            timeout: options.timeout,
        });
        let code = self.finish(outcome, LINES_CHUNK, err, options);
        debug!(runner = DESCRIPTOR.name, exit_code = code, "Lines executed");
    }

    fn is_abort_supported(&self) -> bool {
        true
    }

    fn do_abort(&self) {
        self.interpreter.request_abort();
    }

    fn begin_run(&self) {
        self.interpreter.begin_run();
    }

    fn end_run(&self) {
        self.interpreter.end_run();
    }

    fn do_close(&self) {
        self.redirect.clear();
        self.interpreter.close();
    }

    fn do_exec_before(&self, statements: &[String]) {
        self.interpreter.set_exec_before(statements);
    }

    fn do_exec_after(&self, statements: &[String]) {
        self.interpreter.set_exec_after(statements);
    }

    fn command_line_help(&self) -> Option<String> {
        Some(
            "Lua scripts (.lua) run in the embedded Lua 5.4 VM.\n\
             Script arguments are available as `arg[1..n]` and as `...`;\n\
             `os.exit(n)` ends the script with exit code n."
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ScriptRunner;
    use crate::lifecycle::Lifecycle;
    use polyrun_utils::bundle::BundlePaths;
    use polyrun_utils::test_support::write_script;
    use std::thread;
    use tempfile::TempDir;

    fn runner() -> Arc<Lifecycle<LuaBackend>> {
        let interpreter = Arc::new(LuaInterpreter::new());
        interpreter.set_check_interval(100);
        Arc::new(Lifecycle::new(
            LuaBackend::new(interpreter),
            Arc::new(BundlePaths::new()),
        ))
    }

    fn captured() -> (RunOptions, polyrun_utils::CaptureBuffer, polyrun_utils::CaptureBuffer) {
        let (out, out_buf) = OutputSink::capture();
        let (err, err_buf) = OutputSink::capture();
        (RunOptions::default().with_out(out).with_err(err), out_buf, err_buf)
    }

    #[test]
    fn test_eval_prints_to_sink() {
        let runner = runner();
        let (mut options, out, _) = captured();
        let code = runner.eval_script("print('hello', 1 + 1, nil)", &mut options);
        assert_eq!(code, codes::SUCCESS);
        assert_eq!(out.contents(), "hello\t2\tnil\n");
        assert_eq!(options.error_line, crate::options::UNKNOWN_LINE);
    }

    #[test]
    fn test_silent_run_prints_nothing() {
        let runner = runner();
        let (options, out, _) = captured();
        let mut options = options.silent();
        assert_eq!(runner.eval_script("print('x')", &mut options), codes::SUCCESS);
        assert!(out.contents().is_empty());
    }

    #[test]
    fn test_script_error_maps_line() {
        let runner = runner();
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "broken.lua", "local a = 1\n\nerror('boom')\n");
        let (mut options, _, err) = captured();
        let code = runner.run_script(script.to_str().unwrap(), &[], &mut options);
        assert_eq!(code, codes::SCRIPT_ERROR);
        assert_eq!(options.error_line, 3);
        assert!(err.contents().contains("boom"));
    }

    #[test]
    fn test_syntax_error_maps_line() {
        let runner = runner();
        let (mut options, _, _) = captured();
        let code = runner.eval_script("local x = 1\nlocal = 2\n", &mut options);
        assert_eq!(code, codes::SCRIPT_ERROR);
        assert_eq!(options.error_line, 2);
    }

    #[test]
    fn test_os_exit_sets_code() {
        let runner = runner();
        let (mut options, _, err) = captured();
        assert_eq!(runner.eval_script("os.exit(7)", &mut options), 7);
        assert_eq!(runner.eval_script("os.exit(true)", &mut options), 0);
        assert_eq!(runner.eval_script("os.exit(false)", &mut options), 1);
        assert!(err.contents().is_empty());
    }

    #[test]
    fn test_script_args() {
        let runner = runner();
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "args.lua",
            "local first = ...\nprint(first, arg[2], #arg)\n",
        );
        let (mut options, out, _) = captured();
        let args = vec!["a".to_string(), "b".to_string()];
        let code = runner.run_script(script.to_str().unwrap(), &args, &mut options);
        assert_eq!(code, codes::SUCCESS);
        assert_eq!(out.contents(), "a\tb\t2\n");
    }

    #[test]
    fn test_require_from_script_folder() {
        let runner = runner();
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "helper.lua", "return { answer = 42 }\n");
        let script = write_script(
            dir.path(),
            "main.lua",
            "local helper = require('helper')\nos.exit(helper.answer)\n",
        );
        let mut options = RunOptions::default().silent();
        assert_eq!(runner.run_script(script.to_str().unwrap(), &[], &mut options), 42);
    }

    #[test]
    fn test_script_folder_modules_do_not_leak() {
        let runner = runner();
        let root = TempDir::new().unwrap();
        let mut mains = Vec::new();
        for (folder, answer) in [("a", 1), ("b", 2)] {
            let dir = root.path().join(folder);
            std::fs::create_dir(&dir).unwrap();
            write_script(&dir, "helper.lua", &format!("return {{ answer = {answer} }}\n"));
            mains.push(write_script(
                &dir,
                "main.lua",
                "os.exit(require('helper').answer)\n",
            ));
        }
        let mut options = RunOptions::default().silent();
        assert_eq!(runner.run_script(mains[0].to_str().unwrap(), &[], &mut options), 1);
        assert_eq!(runner.run_script(mains[1].to_str().unwrap(), &[], &mut options), 2);

        let folder_a = root.path().join("a").display().to_string();
        let check = format!("os.exit(package.path:find({folder_a:?}, 1, true) and 1 or 0)");
        assert_eq!(runner.eval_script(&check, &mut options), 0);
    }

    #[test]
    fn test_timeout() {
        let runner = runner();
        let mut options = RunOptions::default()
            .silent()
            .with_timeout(Duration::from_millis(100));
        assert_eq!(runner.eval_script("while true do end", &mut options), codes::TIMEOUT);
    }

    fn spin(runner: &Arc<Lifecycle<LuaBackend>>) -> thread::JoinHandle<i32> {
        let runner = Arc::clone(runner);
        thread::spawn(move || {
            let mut options = RunOptions::default().silent();
            runner.eval_script("while true do end", &mut options)
        })
    }

    fn wait_running(runner: &Arc<Lifecycle<LuaBackend>>) {
        while !runner.is_running() {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_abort_from_another_thread() {
        let runner = runner();
        let worker = spin(&runner);
        wait_running(&runner);
        runner.abort();
        assert_eq!(worker.join().unwrap(), codes::ABORTED);
        assert!(!runner.is_running());

        let mut options = RunOptions::default().silent();
        assert_eq!(runner.eval_script("x = 1", &mut options), codes::SUCCESS);
    }

    #[test]
    fn test_idle_abort_does_not_stop_next_run() {
        let runner = runner();
        runner.abort();
        let mut options = RunOptions::default().silent();
        assert_eq!(runner.eval_script("x = 1", &mut options), codes::SUCCESS);
    }

    #[test]
    fn test_queued_run_starts_clean_after_abort() {
        let interpreter = Arc::new(LuaInterpreter::new());
        interpreter.set_check_interval(100);
        let make = || {
            Arc::new(Lifecycle::new(
                LuaBackend::new(Arc::clone(&interpreter)),
                Arc::new(BundlePaths::new()),
            ))
        };
        let (first, second) = (make(), make());

        let (out, started) = OutputSink::capture();
        let spinning = {
            let first = Arc::clone(&first);
            thread::spawn(move || {
                let mut options = RunOptions::default().with_out(out);
                first.eval_script("print('spinning') while true do end", &mut options)
            })
        };
        while started.contents().is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        let queued = {
            let second = Arc::clone(&second);
            thread::spawn(move || {
                let mut options = RunOptions::default().silent();
                second.eval_script("os.exit(3)", &mut options)
            })
        };
        wait_running(&second);

        first.abort();
        assert_eq!(spinning.join().unwrap(), codes::ABORTED);
        assert_eq!(queued.join().unwrap(), 3);
    }

    #[test]
    fn test_runs_on_one_vm_do_not_interleave() {
        let runner = runner();
        let (out, buffer) = OutputSink::capture();
        let source = "print('start') local t = os.clock() + 0.05 while os.clock() < t do end print('end')";
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let runner = Arc::clone(&runner);
                let out = out.clone();
                thread::spawn(move || {
                    let mut options = RunOptions::default().with_out(out);
                    runner.eval_script(source, &mut options)
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), codes::SUCCESS);
        }
        assert_eq!(buffer.contents(), "start\nend\nstart\nend\n");
    }

    #[test]
    fn test_exec_before_and_after() {
        let runner = runner();
        runner.exec_before(&["greeting = 'hi'".to_string()]);
        runner.exec_after(&["print('done')".to_string()]);
        let (mut options, out, _) = captured();
        assert_eq!(runner.eval_script("print(greeting)", &mut options), codes::SUCCESS);
        assert_eq!(out.contents(), "hi\ndone\n");
    }

    #[test]
    fn test_redirect_used_when_no_call_sink() {
        let runner = runner();
        let (out, buffer) = OutputSink::capture();
        assert!(runner.redirect(out, OutputSink::stderr()));
        let mut options = RunOptions::default();
        runner.eval_script("print('redirected')", &mut options);
        assert_eq!(buffer.contents(), "redirected\n");
    }

    #[test]
    fn test_close_drops_vm_state() {
        let runner = runner();
        let mut options = RunOptions::default().silent();
        runner.eval_script("counter = 41", &mut options);
        assert_eq!(runner.eval_script("os.exit(counter + 1)", &mut options), 42);
        runner.close();
        assert!(!runner.backend().interpreter().is_started());
        assert_eq!(
            runner.eval_script("os.exit(counter == nil and 0 or 1)", &mut options),
            0
        );
    }

    #[test]
    fn test_run_lines_does_not_panic_on_error() {
        let runner = runner();
        let mut options = RunOptions::default().silent();
        runner.run_lines("error('x')", &mut options);
        assert_eq!(options.error_line, 1);
    }
}
