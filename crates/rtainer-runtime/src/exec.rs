//! Thread-backed implementation of the executive seam.
//!
//! Each task runs on its own std thread. The executive models the
//! single-processor scheduler the isolation subsystem is specified
//! against: [`ThreadExecutive::sample_running`] picks one running task per
//! tick (round-robin, restricted to tasks the admission check accepts) as
//! "the currently running task" for accounting.
//! Kill is cooperative: the task is marked finished and its thread is
//! detached; an RTOS scheduler would reclaim it immediately.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::{TaskId, Tick};
use rtainer_core::task::{Executive, TaskState};

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

#[derive(Debug)]
struct TaskEntry {
    name: String,
    state: TaskState,
    killed: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct ExecInner {
    tasks: HashMap<TaskId, TaskEntry>,
    next_id: u64,
    rr_cursor: usize,
}

/// A std-thread executive backend.
#[derive(Debug, Default)]
pub struct ThreadExecutive {
    inner: Arc<Mutex<ExecInner>>,
    ticks: AtomicU64,
}

impl ThreadExecutive {
    /// Creates an executive with no tasks and the tick counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the calling thread as a task (used by the CLI shell so
    /// path-bearing operations have a task context).
    pub fn adopt_current(&self, name: &str) -> TaskId {
        let id = {
            let mut inner = lock(&self.inner);
            inner.next_id += 1;
            let id = TaskId::new(inner.next_id);
            let _ = inner.tasks.insert(
                id,
                TaskEntry {
                    name: name.to_owned(),
                    state: TaskState::Running,
                    killed: Arc::new(AtomicBool::new(false)),
                    handle: None,
                },
            );
            id
        };
        CURRENT_TASK.with(|current| current.set(Some(id)));
        id
    }

    /// Advances the clock by one tick and returns the new tick count.
    pub fn advance_tick(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Single-processor approximation of "the currently running task":
    /// one running task per call, round-robin. Tasks for which `eligible`
    /// returns false are skipped, exactly as the scheduler skips tasks
    /// the admission check gates; a gated task is therefore never the
    /// current task and never charged by the tick hook.
    pub fn sample_running(&self, eligible: impl Fn(TaskId) -> bool) -> Option<TaskId> {
        let mut running: Vec<TaskId> = {
            let inner = lock(&self.inner);
            inner
                .tasks
                .iter()
                .filter(|(_, e)| e.state == TaskState::Running)
                .map(|(id, _)| *id)
                .collect()
        };
        running.sort_by_key(|id| id.value());
        // The predicate may take other subsystem locks; evaluate it
        // without holding the executive lock.
        running.retain(|id| eligible(*id));
        if running.is_empty() {
            return None;
        }
        let mut inner = lock(&self.inner);
        let pick = running[inner.rr_cursor % running.len()];
        inner.rr_cursor = inner.rr_cursor.wrapping_add(1);
        Some(pick)
    }

    /// Returns the task's kill flag, which cooperative task bodies may
    /// poll.
    #[must_use]
    pub fn kill_flag(&self, task: TaskId) -> Option<Arc<AtomicBool>> {
        lock(&self.inner).tasks.get(&task).map(|e| Arc::clone(&e.killed))
    }

    /// Returns the task's name, if the task is known.
    #[must_use]
    pub fn task_name(&self, task: TaskId) -> Option<String> {
        lock(&self.inner).tasks.get(&task).map(|e| e.name.clone())
    }

    /// Blocks until the task finishes or the timeout elapses; returns
    /// whether it finished.
    pub fn wait_finished(&self, task: TaskId, timeout: Duration) -> bool {
        let handle = lock(&self.inner)
            .tasks
            .get_mut(&task)
            .and_then(|e| e.handle.take());
        if let Some(handle) = handle {
            // Join covers the common case; the poll below covers adopted
            // and killed tasks.
            let _ = handle.join();
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.task_state(task) == TaskState::Finished {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

fn lock(inner: &Arc<Mutex<ExecInner>>) -> std::sync::MutexGuard<'_, ExecInner> {
    inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Executive for ThreadExecutive {
    fn spawn(&self, name: &str, entry: Box<dyn FnOnce() + Send>) -> Result<TaskId> {
        // The entry is registered before the thread starts so the task
        // cannot finish before it exists in the table.
        let id = {
            let mut inner = lock(&self.inner);
            inner.next_id += 1;
            let id = TaskId::new(inner.next_id);
            let _ = inner.tasks.insert(
                id,
                TaskEntry {
                    name: name.to_owned(),
                    state: TaskState::Running,
                    killed: Arc::new(AtomicBool::new(false)),
                    handle: None,
                },
            );
            id
        };
        let shared = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                CURRENT_TASK.with(|current| current.set(Some(id)));
                entry();
                if let Some(entry) = lock(&shared).tasks.get_mut(&id) {
                    entry.state = TaskState::Finished;
                }
            });
        match spawned {
            Ok(handle) => {
                let mut inner = lock(&self.inner);
                if let Some(entry) = inner.tasks.get_mut(&id) {
                    entry.handle = Some(handle);
                }
                tracing::debug!(name, %id, "task spawned");
                Ok(id)
            }
            Err(e) => {
                let _ = lock(&self.inner).tasks.remove(&id);
                Err(RtainerError::Io {
                    path: std::path::PathBuf::from(name),
                    source: e,
                })
            }
        }
    }

    fn kill(&self, task: TaskId) -> Result<()> {
        let mut inner = lock(&self.inner);
        let entry = inner.tasks.get_mut(&task).ok_or_else(|| RtainerError::NotFound {
            kind: "task",
            id: task.to_string(),
        })?;
        entry.killed.store(true, Ordering::Relaxed);
        entry.state = TaskState::Finished;
        // The thread is detached; a hung task body keeps its thread but is
        // no longer schedulable as far as the executive is concerned.
        let _ = entry.handle.take();
        tracing::debug!(%task, "task killed");
        Ok(())
    }

    fn task_state(&self, task: TaskId) -> TaskState {
        lock(&self.inner)
            .tasks
            .get(&task)
            .map_or(TaskState::Finished, |e| e.state)
    }

    fn current_task(&self) -> Option<TaskId> {
        CURRENT_TASK.with(Cell::get)
    }

    fn now(&self) -> Tick {
        self.ticks.load(Ordering::Relaxed)
    }
}
