//! Thread-safe current-state container with guarded transitions.
//!
//! One mutex guards the current state; one condition variable is signalled
//! whenever the machine enters a resting state or stops. Every real change
//! runs `on_exit` on the old state and then `on_enter` on the new one while
//! the lock is held, so no other transition can interleave between the two.
//! Callbacks must not call back into the machine.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::error;

/// A value a [`StateMachine`] can hold.
pub trait MachineState: Send + Sync + 'static {
    /// Whether the machine may be switched away from this state at any time.
    fn is_resting(&self) -> bool;

    fn on_enter(&self) {}

    fn on_exit(&self) {}
}

struct Inner<S> {
    current: Arc<S>,
    stopped: bool,
}

pub struct StateMachine<S: MachineState> {
    inner: Mutex<Inner<S>>,
    resting_or_stopped: Condvar,
}

impl<S: MachineState> StateMachine<S> {
    pub fn new(initial: S) -> Self {
        initial.on_enter();
        Self {
            inner: Mutex::new(Inner {
                current: Arc::new(initial),
                stopped: false,
            }),
            resting_or_stopped: Condvar::new(),
        }
    }

    // Callbacks run under catch_unwind, so a poisoned lock still holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Arc<S> {
        Arc::clone(&self.lock().current)
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Atomically replace the current state with `modifier(current)`.
    ///
    /// Returning the same `Arc` (by pointer) means "no change" and runs no
    /// callbacks. Returns false without calling `modifier` if the machine is
    /// stopped, or if a callback panicked (which stops the machine).
    pub fn change_current_state<F>(&self, modifier: F) -> bool
    where
        F: FnOnce(&Arc<S>) -> Arc<S>,
    {
        let mut inner = self.lock();
        if inner.stopped {
            return false;
        }
        let current = Arc::clone(&inner.current);
        match panic::catch_unwind(AssertUnwindSafe(|| modifier(&current))) {
            Ok(next) => self.install(&mut inner, next),
            Err(_) => {
                self.fail(&mut inner, "state modifier");
                false
            }
        }
    }

    /// Block until the current state is resting or the machine stops, then
    /// install `next`. Returns false if the machine stopped first.
    pub fn switch_from_resting_state(&self, next: S) -> bool {
        let mut inner = self.lock();
        while !inner.stopped && !inner.current.is_resting() {
            inner = self
                .resting_or_stopped
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if inner.stopped {
            return false;
        }
        self.install(&mut inner, Arc::new(next))
    }

    /// Run the exit callback of the current state, mark the machine stopped
    /// and wake every waiter.
    ///
    /// Returns the state the machine was in, or `None` if it was already
    /// stopped.
    pub fn stop(&self) -> Option<Arc<S>> {
        let mut inner = self.lock();
        if inner.stopped {
            return None;
        }
        inner.stopped = true;
        let last = Arc::clone(&inner.current);
        if panic::catch_unwind(AssertUnwindSafe(|| last.on_exit())).is_err() {
            error!("exit callback panicked while stopping state machine");
        }
        self.resting_or_stopped.notify_all();
        Some(last)
    }

    fn install(&self, inner: &mut Inner<S>, next: Arc<S>) -> bool {
        if Arc::ptr_eq(&inner.current, &next) {
            return true;
        }
        let old = std::mem::replace(&mut inner.current, Arc::clone(&next));

        if panic::catch_unwind(AssertUnwindSafe(|| old.on_exit())).is_err() {
            self.fail(inner, "exit callback");
            return false;
        }
        if panic::catch_unwind(AssertUnwindSafe(|| next.on_enter())).is_err() {
            self.fail(inner, "enter callback");
            return false;
        }
        if next.is_resting() {
            self.resting_or_stopped.notify_all();
        }
        true
    }

    // Exit/enter must never run twice, so a panicking callback ends the machine
    // without running any further callbacks.
    fn fail(&self, inner: &mut Inner<S>, what: &str) {
        error!("{} panicked; stopping state machine", what);
        inner.stopped = true;
        self.resting_or_stopped.notify_all();
    }
}
