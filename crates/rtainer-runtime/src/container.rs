//! The container struct and its externally visible snapshot.

use std::sync::Arc;

use serde::Serialize;

use rtainer_common::types::{ContainerId, ContainerState, ResourceLimits, TaskId};
use rtainer_core::cgroup::CGroupId;
use rtainer_core::namespace::{IpcNamespaceId, PidNamespaceId};

use crate::gate::Gate;

/// A container: one task plus its cgroup, PID namespace, IPC namespace,
/// and private filesystem root.
///
/// A container only ever exists fully resourced; the manager unwinds
/// partial construction before the struct is added to the list.
#[derive(Debug)]
pub struct Container {
    /// Unique monotonic identifier.
    pub id: ContainerId,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Task handle; present exactly while the container is running or
    /// paused.
    pub task: Option<TaskId>,
    /// Name of the entry image in the store.
    pub image: String,
    /// Program file inside the container directory.
    pub program: String,
    /// Working directory, `/var/container/<id>`.
    pub root_dir: String,
    /// Resource controller handle.
    pub cgroup: CGroupId,
    /// PID namespace handle.
    pub pid_namespace: PidNamespaceId,
    /// IPC namespace handle.
    pub ipc_namespace: IpcNamespaceId,
    /// Limits the cgroup was created with.
    pub limits: ResourceLimits,
    /// Startup gate, present while a start is in flight.
    pub(crate) gate: Option<Arc<Gate>>,
}

/// Serializable point-in-time view of a container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    /// Unique identifier.
    pub id: ContainerId,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Task handle if running.
    pub task: Option<TaskId>,
    /// Entry image name.
    pub image: String,
    /// Memory limit in bytes.
    pub memory_limit: u64,
    /// CPU quota in ticks per window.
    pub cpu_quota_ticks: u32,
}

impl From<&Container> for ContainerInfo {
    fn from(container: &Container) -> Self {
        Self {
            id: container.id,
            name: container.name.clone(),
            state: container.state,
            task: container.task,
            image: container.image.clone(),
            memory_limit: container.limits.memory_bytes,
            cpu_quota_ticks: container.limits.cpu_quota_ticks,
        }
    }
}
