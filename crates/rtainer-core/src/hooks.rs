//! The isolation façade and its scheduler entry points.
//!
//! [`Isolation`] owns one instance of every controller and exposes the four
//! hooks the host scheduler drives: the tick hook, the switch-out hook, the
//! admission check, and the task-delete hook. The hooks contain no I/O and
//! only capacity-bounded loops, so they are safe to call from tick context.

use std::sync::Arc;

use rtainer_common::types::{TaskId, Tick};

use crate::cgroup::CGroupSet;
use crate::namespace::ipc::IpcRegistry;
use crate::namespace::pid::PidNamespaceSet;
use crate::task::TaskTable;

/// Aggregates the isolation controllers behind the scheduler hooks.
#[derive(Debug)]
pub struct Isolation {
    /// The cgroup table.
    pub cgroups: CGroupSet,
    /// The PID namespace table (root namespace included).
    pub pid_namespaces: PidNamespaceSet,
    /// The IPC namespace registry (root namespace included). Shared so
    /// isolated IPC handles can hold a reference.
    pub ipc: Arc<IpcRegistry>,
    /// Per-task filesystem state.
    pub tasks: Arc<TaskTable>,
}

impl Default for Isolation {
    fn default() -> Self {
        Self::new()
    }
}

impl Isolation {
    /// Initialises the subsystem. Order is deliberate: the PID root
    /// namespace first, then the IPC root namespace, then the cgroup
    /// table.
    #[must_use]
    pub fn new() -> Self {
        let pid_namespaces = PidNamespaceSet::new();
        let ipc = Arc::new(IpcRegistry::new());
        let cgroups = CGroupSet::new();
        tracing::info!("isolation subsystem initialised");
        Self {
            cgroups,
            pid_namespaces,
            ipc,
            tasks: Arc::new(TaskTable::new()),
        }
    }

    /// Tick hook. Charges the running task's cgroup and advances every
    /// cgroup's window and penalty state. Called once per tick from
    /// interrupt context.
    pub fn on_tick(&self, now: Tick, current: Option<TaskId>) {
        self.cgroups.on_tick(now, current);
    }

    /// Switch-out hook, called when the scheduler deschedules a task.
    pub fn on_task_switch_out(&self, task: TaskId) {
        self.cgroups.on_switch_out(task);
    }

    /// Admission check: the scheduler must skip a task for which this
    /// returns false and pick the next eligible runnable task.
    #[must_use]
    pub fn can_run(&self, task: TaskId) -> bool {
        self.cgroups.can_run(task)
    }

    /// Task-delete hook: clears the task's namespace memberships and its
    /// side-table entry. The cgroup binding is removed by whoever owns the
    /// task's lifecycle (the container manager), since removal needs the
    /// cgroup handle for the wrong-group check.
    pub fn on_task_delete(&self, task: TaskId) {
        self.pid_namespaces.on_task_delete(task);
        self.ipc.on_task_delete(task);
        self.tasks.on_task_delete(task);
    }
}
