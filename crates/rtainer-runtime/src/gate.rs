//! The single-shot startup gate.
//!
//! A newly created container task blocks at the entry of its wrapper until
//! the manager releases the gate, which it does only after the task has
//! been joined to its cgroup. The release therefore happens-before the
//! task's first instruction of user code.

use std::sync::{Condvar, Mutex};

/// One-shot release primitive; released once, never reset.
#[derive(Debug, Default)]
pub struct Gate {
    released: Mutex<bool>,
    condvar: Condvar,
}

impl Gate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the gate, waking all waiters.
    pub fn release(&self) {
        let mut released = self
            .released
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *released = true;
        drop(released);
        self.condvar.notify_all();
    }

    /// Blocks until the gate is released. Returns immediately if it
    /// already was.
    pub fn wait(&self) {
        let mut released = self
            .released
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while !*released {
            released = self
                .condvar
                .wait(released)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_after_release_returns_immediately() {
        let gate = Gate::new();
        gate.release();
        gate.wait();
    }

    #[test]
    fn release_wakes_a_blocked_waiter() {
        let gate = Arc::new(Gate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait())
        };
        gate.release();
        waiter.join().expect("waiter joins");
    }
}
