//! Process-tree termination.
//!
//! On Unix every child is started as the leader of a fresh process group, so
//! `killpg` reaches the interpreter and anything it spawned. On Windows the
//! child is placed in a Job Object and the whole job is terminated.

use std::process::{Child, Command};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Time a process group gets between SIGTERM and SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// RAII wrapper for a Windows Job Object handle
#[cfg(windows)]
struct JobObjectHandle {
    handle: windows::Win32::Foundation::HANDLE,
}

// SAFETY: a job HANDLE is an opaque kernel object reference usable from any thread.
#[cfg(windows)]
unsafe impl Send for JobObjectHandle {}
#[cfg(windows)]
unsafe impl Sync for JobObjectHandle {}

#[cfg(windows)]
impl Drop for JobObjectHandle {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

/// Put the child into its own process group before exec.
pub(crate) fn prepare(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

struct Inner {
    pid: u32,
    killed: AtomicBool,
    exited: AtomicBool,
    #[cfg(windows)]
    job: JobObjectHandle,
}

/// Cloneable handle that terminates a running child and its descendants.
///
/// Safe to call from any thread, any number of times.
#[derive(Clone)]
pub struct KillHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for KillHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillHandle")
            .field("pid", &self.inner.pid)
            .field("killed", &self.was_killed())
            .finish()
    }
}

impl KillHandle {
    /// Attach to a freshly spawned child.
    pub(crate) fn attach(child: &Child) -> Result<Self, ProcessError> {
        let pid = child.id();
        #[cfg(windows)]
        let job = {
            let job = create_job_object()?;
            assign_to_job(&job, pid)?;
            job
        };
        Ok(Self {
            inner: Arc::new(Inner {
                pid,
                killed: AtomicBool::new(false),
                exited: AtomicBool::new(false),
                #[cfg(windows)]
                job,
            }),
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Whether [`kill`](Self::kill) was requested.
    #[must_use]
    pub fn was_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_exited(&self) {
        self.inner.exited.store(true, Ordering::SeqCst);
    }

    /// Terminate the process tree. Does not block.
    pub fn kill(&self) {
        if self.inner.exited.load(Ordering::SeqCst) {
            debug!(pid = self.inner.pid, "Kill requested after exit; ignoring");
            return;
        }
        if self.inner.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(pid = self.inner.pid, "Terminating process tree");
        self.terminate();
    }

    #[cfg(unix)]
    fn terminate(&self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(self.inner.pid as i32);
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            warn!(pid = self.inner.pid, error = %e, "SIGTERM to process group failed");
        }

        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let step = Duration::from_millis(50);
            let mut waited = Duration::ZERO;
            while waited < KILL_GRACE {
                if inner.exited.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(step);
                waited += step;
            }
            let _ = killpg(pgid, Signal::SIGKILL);
        });
    }

    #[cfg(windows)]
    fn terminate(&self) {
        use windows::Win32::System::JobObjects::TerminateJobObject;

        unsafe {
            if let Err(e) = TerminateJobObject(self.inner.job.handle, 1) {
                warn!(pid = self.inner.pid, error = %e, "Failed to terminate Job Object");
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn terminate(&self) {
        warn!(pid = self.inner.pid, "Process tree termination unsupported on this platform");
    }
}

/// Create a Job Object whose processes die when the last handle closes.
#[cfg(windows)]
fn create_job_object() -> Result<JobObjectHandle, ProcessError> {
    use windows::Win32::System::JobObjects::{
        CreateJobObjectW, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
        JobObjectExtendedLimitInformation, SetInformationJobObject,
    };

    unsafe {
        let job = CreateJobObjectW(None, None).map_err(|e| ProcessError::TreeSetup {
            reason: format!("Failed to create Job Object: {e}"),
        })?;

        let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
        info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;

        SetInformationJobObject(
            job,
            JobObjectExtendedLimitInformation,
            (&raw const info).cast(),
            std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
        )
        .map_err(|e| ProcessError::TreeSetup {
            reason: format!("Failed to configure Job Object: {e}"),
        })?;

        Ok(JobObjectHandle { handle: job })
    }
}

#[cfg(windows)]
fn assign_to_job(job: &JobObjectHandle, pid: u32) -> Result<(), ProcessError> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::JobObjects::AssignProcessToJobObject;
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_ALL_ACCESS};

    unsafe {
        let process_handle =
            OpenProcess(PROCESS_ALL_ACCESS, false, pid).map_err(|e| ProcessError::TreeSetup {
                reason: format!("Failed to open process for job assignment: {e}"),
            })?;

        let assigned = AssignProcessToJobObject(job.handle, process_handle);
        let _ = CloseHandle(process_handle);
        assigned.map_err(|e| ProcessError::TreeSetup {
            reason: format!("Failed to assign process to Job Object: {e}"),
        })
    }
}
