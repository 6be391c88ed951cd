//! Process-wide single-writer gate.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Writing,
    Frozen,
}

/// Guards every persisted write: at most one write in flight across the whole
/// process, whichever profile it targets.
///
/// [`WriterGate::freeze`] is a one-way `Open → Frozen` transition. Once frozen,
/// every later writer (including a second `freeze`) blocks for the rest of the
/// process lifetime.
#[derive(Debug)]
pub struct WriterGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Default for WriterGate {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState::Open),
            changed: Condvar::new(),
        }
    }
}

impl WriterGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclusive_write<T>(&self, write: impl FnOnce() -> T) -> T {
        {
            let mut state = self.wait_until_open();
            *state = GateState::Writing;
        }

        // Reopen even if `write` panics so one bad write cannot wedge the process.
        let _release = Release(self);
        write()
    }

    /// Wait for any in-flight write, then stop all future writes permanently.
    pub fn freeze(&self) {
        let mut state = self.wait_until_open();
        *state = GateState::Frozen;
        info!("writer gate frozen; no further profile writes this run");
    }

    pub fn is_frozen(&self) -> bool {
        *self.lock() == GateState::Frozen
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until_open(&self) -> MutexGuard<'_, GateState> {
        let guard = self.lock();
        self.changed
            .wait_while(guard, |state| *state != GateState::Open)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct Release<'a>(&'a WriterGate);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if *state == GateState::Writing {
            *state = GateState::Open;
        }
        drop(state);
        self.0.changed.notify_all();
    }
}
