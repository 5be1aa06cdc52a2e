//! Interpreter backends.
//!
//! [`lua`] embeds one process-wide Lua VM; [`process`] launches an external
//! interpreter per run and is specialized by the per-language modules.
//! [`text`] is an editor-only type that executes nothing.

pub mod applescript;
pub mod javascript;
pub mod lua;
pub mod powershell;
pub mod process;
pub mod python;
pub mod text;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use polyrun_utils::OutputSink;

use crate::options::RunOptions;

/// Streams installed by a successful `redirect`.
#[derive(Default)]
pub(crate) struct RedirectSlot(Mutex<Option<(OutputSink, OutputSink)>>);

impl RedirectSlot {
    fn lock(&self) -> MutexGuard<'_, Option<(OutputSink, OutputSink)>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, out: OutputSink, err: OutputSink) -> bool {
        *self.lock() = Some((out, err));
        true
    }

    pub(crate) fn clear(&self) {
        self.lock().take();
    }

    /// Where a run's stdout and stderr go: nowhere when silent, otherwise
    /// the per-call sinks, then the redirect, then the process streams.
    pub(crate) fn sinks(&self, options: &RunOptions) -> (Option<OutputSink>, Option<OutputSink>) {
        if options.silent {
            return (None, None);
        }
        let redirected = self.lock().clone();
        let (redirect_out, redirect_err) = match redirected {
            Some((out, err)) => (Some(out), Some(err)),
            None => (None, None),
        };
        let out = options
            .out
            .clone()
            .or(redirect_out)
            .unwrap_or_else(OutputSink::stdout);
        let err = options
            .err
            .clone()
            .or(redirect_err)
            .unwrap_or_else(OutputSink::stderr);
        (Some(out), Some(err))
    }
}

/// Abort request shared by every run of one backend.
///
/// A request made while nothing runs is dropped when the next run begins. A
/// request made once a run has begun stays set until a run finishes, even if
/// that run is still waiting for the interpreter.
#[derive(Default)]
pub(crate) struct AbortLatch {
    requested: Arc<AtomicBool>,
    active: AtomicUsize,
}

impl AbortLatch {
    pub(crate) fn begin(&self) {
        if self.active.fetch_add(1, Ordering::SeqCst) == 0 {
            self.requested.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn end(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Called by the run that finishes so runs queued behind it start clean.
    pub(crate) fn consume(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// The flag itself, for interpreter hooks that outlive a borrow.
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_latch_keeps_request_made_after_begin() {
        let latch = AbortLatch::default();
        latch.request();
        latch.begin();
        assert!(!latch.is_requested(), "idle request is stale");

        latch.request();
        latch.begin();
        assert!(latch.is_requested(), "queued run must not clear a live request");

        latch.consume();
        latch.end();
        latch.end();
        latch.end();
        latch.request();
        latch.begin();
        assert!(!latch.is_requested());
    }

    #[test]
    fn test_sinks_precedence() {
        let slot = RedirectSlot::default();
        let (call_out, _) = OutputSink::capture();
        let (redirect_out, _) = OutputSink::capture();
        let (redirect_err, _) = OutputSink::capture();

        let options = RunOptions::default().with_out(call_out.clone());
        slot.set(redirect_out.clone(), redirect_err.clone());
        let (out, err) = slot.sinks(&options);
        assert!(out.unwrap().same_as(&call_out));
        assert!(err.unwrap().same_as(&redirect_err));

        let (out, _) = slot.sinks(&RunOptions::default());
        assert!(out.unwrap().same_as(&redirect_out));

        assert!(matches!(slot.sinks(&options.clone().silent()), (None, None)));

        slot.clear();
        let (out, _) = slot.sinks(&RunOptions::default());
        assert!(!out.unwrap().same_as(&redirect_out));
    }
}
