use std::io::Read;
use std::process::{Child, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use polyrun_utils::tail::DEFAULT_CAPTURE_BYTES;
use polyrun_utils::{OutputSink, TailBuffer};
use tracing::{debug, warn};

use crate::command_spec::CommandSpec;
use crate::error::ProcessError;
use crate::tree::{self, KillHandle};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for pump threads after the child exited. A descendant
/// that escaped the process tree can hold the pipes open indefinitely.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a child's output goes.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Destination for stdout; `None` discards it.
    pub stdout: Option<OutputSink>,
    /// Destination for stderr; `None` discards it (the tail is still kept).
    pub stderr: Option<OutputSink>,
    /// Bytes of stderr kept for error-line mapping.
    pub stderr_tail_bytes: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            stdout: None,
            stderr: None,
            stderr_tail_bytes: DEFAULT_CAPTURE_BYTES,
        }
    }
}

impl PumpConfig {
    #[must_use]
    pub fn to_sinks(stdout: OutputSink, stderr: OutputSink) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            ..Self::default()
        }
    }
}

/// Result of a finished child.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the child was ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// A [`KillHandle::kill`] was issued before the child exited.
    pub killed: bool,
    /// Tail of stderr, lossily decoded.
    pub stderr_tail: String,
    pub duration: Duration,
}

impl ProcessOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.killed
    }
}

/// A spawned child whose output is being pumped.
pub struct RunningProcess {
    child: Child,
    program: String,
    kill: KillHandle,
    stderr_tail: Arc<Mutex<TailBuffer>>,
    pumps_done: mpsc::Receiver<()>,
    pump_count: usize,
    started: Instant,
}

/// Spawn `spec` with piped output and a null stdin.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] if the program cannot be started and
/// [`ProcessError::TreeSetup`] if it cannot be attached to a kill group.
pub fn spawn(spec: &CommandSpec, pump: PumpConfig) -> Result<RunningProcess, ProcessError> {
    let program = spec.program_name();
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    tree::prepare(&mut cmd);

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let kill = match KillHandle::attach(&child) {
        Ok(kill) => kill,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };
    debug!(program = %program, pid = kill.pid(), "Spawned interpreter process");

    let stderr_tail = Arc::new(Mutex::new(TailBuffer::new(pump.stderr_tail_bytes)));
    let (done_tx, pumps_done) = mpsc::channel();
    let mut pump_count = 0;

    if let Some(stdout) = child.stdout.take() {
        let sink = pump.stdout.clone();
        let done = done_tx.clone();
        thread::spawn(move || {
            pump_stream(stdout, sink, None);
            let _ = done.send(());
        });
        pump_count += 1;
    }

    if let Some(stderr) = child.stderr.take() {
        let sink = pump.stderr.clone();
        let tail = Arc::clone(&stderr_tail);
        let done = done_tx;
        thread::spawn(move || {
            pump_stream(stderr, sink, Some(tail));
            let _ = done.send(());
        });
        pump_count += 1;
    }

    Ok(RunningProcess {
        child,
        program,
        kill,
        stderr_tail,
        pumps_done,
        pump_count,
        started: Instant::now(),
    })
}

fn pump_stream(
    mut stream: impl Read,
    sink: Option<OutputSink>,
    tail: Option<Arc<Mutex<TailBuffer>>>,
) {
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Some(tail) = &tail {
                    tail.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(&buf[..n]);
                }
                if let Some(sink) = &sink
                    && let Err(e) = sink.write_bytes(&buf[..n])
                {
                    debug!(error = %e, "Output sink rejected write");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => break,
        }
    }
}

impl RunningProcess {
    #[must_use]
    pub fn id(&self) -> u32 {
        self.kill.pid()
    }

    /// Handle that can terminate this child from another thread.
    #[must_use]
    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    /// Block until the child exits, killing its tree at the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Wait`] if the OS refuses to report the status.
    pub fn wait(mut self, timeout: Option<Duration>) -> Result<ProcessOutcome, ProcessError> {
        let deadline = timeout.map(|t| self.started + t);
        let mut timed_out = false;

        let status = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    self.kill.kill();
                    return Err(ProcessError::Wait {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
            if !timed_out && deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                warn!(program = %self.program, timeout = ?timeout, "Process exceeded timeout; terminating");
                self.kill.kill();
            }
            thread::sleep(POLL_INTERVAL);
        };
        self.kill.mark_exited();

        let drain_deadline = Instant::now() + PUMP_DRAIN_TIMEOUT;
        for _ in 0..self.pump_count {
            let left = drain_deadline.saturating_duration_since(Instant::now());
            if self.pumps_done.recv_timeout(left).is_err() {
                debug!(program = %self.program, "Output pump still open after exit; detaching");
                break;
            }
        }

        let stderr_tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text();

        Ok(ProcessOutcome {
            exit_code: status.code(),
            timed_out,
            killed: self.kill.was_killed() && !timed_out,
            stderr_tail,
            duration: self.started.elapsed(),
        })
    }
}

/// Run `spec` with inherited stdio (an interpreter REPL) and wait for it.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] or [`ProcessError::Wait`].
pub fn run_interactive(spec: &CommandSpec) -> Result<Option<i32>, ProcessError> {
    let program = spec.program_name();
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let status = child
        .wait()
        .map_err(|source| ProcessError::Wait { program, source })?;
    Ok(status.code())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_pumped_to_sinks() {
        let (out, out_buf) = OutputSink::capture();
        let (err, err_buf) = OutputSink::capture();
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo hello; echo oops 1>&2; exit 3");
        let outcome = spawn(&spec, PumpConfig::to_sinks(out, err))
            .unwrap()
            .wait(None)
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
        assert_eq!(out_buf.contents(), "hello\n");
        assert_eq!(err_buf.contents(), "oops\n");
        assert_eq!(outcome.stderr_tail, "oops\n");
    }

    #[test]
    fn test_silent_still_keeps_stderr_tail() {
        let spec = CommandSpec::new("sh").arg("-c").arg("echo tail 1>&2");
        let outcome = spawn(&spec, PumpConfig::default())
            .unwrap()
            .wait(None)
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stderr_tail, "tail\n");
    }

    #[test]
    fn test_timeout_kills_tree() {
        let spec = CommandSpec::new("sh").arg("-c").arg("sleep 30 & sleep 30");
        let started = Instant::now();
        let outcome = spawn(&spec, PumpConfig::default())
            .unwrap()
            .wait(Some(Duration::from_millis(200)))
            .unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.killed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_kill_handle_from_other_thread() {
        let spec = CommandSpec::new("sh").arg("-c").arg("sleep 30");
        let running = spawn(&spec, PumpConfig::default()).unwrap();
        let handle = running.kill_handle();
        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            handle.kill();
        });
        let outcome = running.wait(None).unwrap();
        killer.join().unwrap();
        assert!(outcome.killed);
        assert!(!outcome.success());
    }

    #[test]
    fn test_spawn_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-interpreter-xyz");
        let err = spawn(&spec, PumpConfig::default()).err().unwrap();
        assert!(err.is_not_found());
    }
}
