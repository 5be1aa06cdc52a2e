//! Abort forwarding for dispatching runners.
//!
//! Network, archive and bundle runners do not execute anything themselves;
//! they hand the run to another runner. [`AbortForwarder`] remembers that
//! runner for the duration of the call so `abort()` reaches it, and forgets it
//! on every exit path so a later abort never hits a finished run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::contract::ScriptRunner;

#[derive(Default)]
pub struct AbortForwarder {
    current: Mutex<Option<Arc<dyn ScriptRunner>>>,
}

/// Clears the forwarder when the delegated call returns or unwinds.
struct ClearOnDrop<'a>(&'a AbortForwarder);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.slot().take();
    }
}

impl AbortForwarder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn ScriptRunner>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `call` against `runner`, forwarding aborts to it meanwhile.
    pub fn delegate<R>(
        &self,
        runner: &Arc<dyn ScriptRunner>,
        call: impl FnOnce(&dyn ScriptRunner) -> R,
    ) -> R {
        debug!(runner = runner.name(), "Delegating run");
        *self.slot() = Some(Arc::clone(runner));
        let _clear = ClearOnDrop(self);
        call(runner.as_ref())
    }

    /// The runner currently delegated to, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn ScriptRunner>> {
        self.slot().clone()
    }

    #[must_use]
    pub fn is_abort_supported(&self) -> bool {
        self.current().is_some_and(|runner| runner.is_abort_supported())
    }

    pub fn abort(&self) {
        // Clone out first; the delegate may take its own locks.
        if let Some(runner) = self.current() {
            runner.abort();
        }
    }
}
