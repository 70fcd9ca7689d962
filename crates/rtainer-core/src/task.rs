//! The executive seam and the per-task side table.
//!
//! The underlying scheduler is an external collaborator; this module pins
//! down the narrow interface the isolation subsystem needs from it
//! ([`Executive`]) and keeps container-local task state (working directory,
//! chroot root) in a side table keyed by task identity, so the scheduler's
//! own task control block stays untouched.

use std::collections::HashMap;
use std::sync::Mutex;

use rtainer_common::error::Result;
use rtainer_common::types::{TaskId, Tick};

/// Scheduler-visible state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The task is runnable or running.
    Running,
    /// The task is blocked on a primitive or delay.
    Blocked,
    /// The task has exited or been deleted.
    Finished,
}

/// Narrow interface to the host scheduler.
pub trait Executive: Send + Sync {
    /// Creates a task running `entry`.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler cannot allocate the task.
    fn spawn(&self, name: &str, entry: Box<dyn FnOnce() + Send>) -> Result<TaskId>;

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Fails if the task is unknown.
    fn kill(&self, task: TaskId) -> Result<()>;

    /// Reports a task's state; unknown tasks report [`TaskState::Finished`].
    fn task_state(&self, task: TaskId) -> TaskState;

    /// The task whose context the caller is running in, if any.
    fn current_task(&self) -> Option<TaskId>;

    /// Current tick count.
    fn now(&self) -> Tick;
}

#[derive(Debug, Clone)]
struct TaskPaths {
    cwd: String,
    root: String,
}

/// Side table of per-task filesystem state.
///
/// Entries are created when a task is registered and removed by the
/// task-delete hook. Tasks without an entry behave as unconfined
/// (root `/`, cwd `/`).
#[derive(Debug, Default)]
pub struct TaskTable {
    entries: Mutex<HashMap<TaskId, TaskPaths>>,
}

impl TaskTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task with default paths.
    pub fn register(&self, task: TaskId) {
        let mut entries = self.lock();
        let _ = entries.entry(task).or_insert_with(|| TaskPaths {
            cwd: "/".to_owned(),
            root: "/".to_owned(),
        });
    }

    /// Returns the task's effective root path.
    #[must_use]
    pub fn root(&self, task: TaskId) -> String {
        self.lock().get(&task).map_or_else(|| "/".to_owned(), |p| p.root.clone())
    }

    /// Replaces the task's root path.
    pub fn set_root(&self, task: TaskId, root: &str) {
        let mut entries = self.lock();
        let entry = entries.entry(task).or_insert_with(|| TaskPaths {
            cwd: "/".to_owned(),
            root: "/".to_owned(),
        });
        entry.root = root.to_owned();
        // The old working directory is meaningless under the new root.
        entry.cwd = "/".to_owned();
    }

    /// Returns the task's working directory (a path under its root).
    #[must_use]
    pub fn cwd(&self, task: TaskId) -> String {
        self.lock().get(&task).map_or_else(|| "/".to_owned(), |p| p.cwd.clone())
    }

    /// Replaces the task's working directory.
    pub fn set_cwd(&self, task: TaskId, cwd: &str) {
        let mut entries = self.lock();
        let entry = entries.entry(task).or_insert_with(|| TaskPaths {
            cwd: "/".to_owned(),
            root: "/".to_owned(),
        });
        entry.cwd = cwd.to_owned();
    }

    /// Task-delete hook: drops the task's entry.
    pub fn on_task_delete(&self, task: TaskId) {
        let _ = self.lock().remove(&task);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskPaths>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
