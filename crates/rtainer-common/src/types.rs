//! Domain primitive types used across the rtainer workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kernel tick count. The executive's clock is the only time source.
pub type Tick = u64;

/// Unique identifier for a container instance.
///
/// Ids are issued monotonically by the container manager and are never
/// reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(u32);

impl ContainerId {
    /// Creates a container ID from its numeric value.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a task, issued by the executive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a task ID from its numeric value.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Resource limits applied to a container's cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes; [`crate::constants::MEMORY_NO_LIMIT`] disables
    /// memory gating.
    pub memory_bytes: u64,
    /// CPU quota in ticks per accounting window;
    /// [`crate::constants::CPU_QUOTA_MAX`] disables CPU gating.
    pub cpu_quota_ticks: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: crate::constants::MEMORY_NO_LIMIT,
            cpu_quota_ticks: crate::constants::CPU_QUOTA_MAX,
        }
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Container exists but has no task.
    Stopped,
    /// Container's task is scheduled.
    Running,
    /// Container's task exists but is suspended.
    Paused,
    /// Isolation verification or the loader failed; only delete is allowed.
    Error,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}
