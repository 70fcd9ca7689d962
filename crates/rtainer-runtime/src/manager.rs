//! The container manager.
//!
//! Owns the mutex-protected container list and the monotonic id counter,
//! and composes the isolation controllers into the container lifecycle.
//! Construction is dependency-ordered (cgroup, PID namespace, IPC
//! namespace, image unpack) and unwinds completely on any step failure.
//! Start holds the new task at a startup gate until it is joined to its
//! cgroup; the task then applies its IPC namespace from its own context,
//! verifies its memberships, chroots, and invokes the loader.

use std::sync::{Arc, Mutex};

use rtainer_common::constants::{MAX_CONTAINERS, MAX_CONTAINER_NAME_LEN};
use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::{ContainerId, ContainerState, ResourceLimits, TaskId};
use rtainer_core::cgroup::CGroupStats;
use rtainer_core::filesystem::{Storage, TaskFs};
use rtainer_core::task::{Executive, TaskState};
use rtainer_core::Isolation;
use rtainer_image::codec;
use rtainer_image::store::ImageStore;

use crate::container::{Container, ContainerInfo};
use crate::gate::Gate;
use crate::loader::ProgramLoader;

#[derive(Debug, Default)]
struct ManagerState {
    containers: Vec<Container>,
    next_id: u32,
}

/// Coordinates container lifecycle over the isolation subsystem, the
/// executive, the storage backend, and the program loader.
pub struct ContainerManager {
    isolation: Arc<Isolation>,
    exec: Arc<dyn Executive>,
    storage: Arc<dyn Storage>,
    fs: TaskFs,
    loader: Arc<dyn ProgramLoader>,
    inner: Arc<Mutex<ManagerState>>,
}

impl ContainerManager {
    /// Creates a manager over its collaborators.
    #[must_use]
    pub fn new(
        isolation: Arc<Isolation>,
        exec: Arc<dyn Executive>,
        storage: Arc<dyn Storage>,
        loader: Arc<dyn ProgramLoader>,
    ) -> Self {
        let fs = TaskFs::new(Arc::clone(&storage), Arc::clone(&isolation.tasks));
        Self {
            isolation,
            exec,
            storage,
            fs,
            loader,
            inner: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Creates a container: cgroup, PID namespace, IPC namespace, then the
    /// image unpacked into `/var/container/<id>`. All-or-nothing; the id
    /// is consumed even if creation fails.
    ///
    /// # Errors
    ///
    /// Fails on capacity exhaustion, an invalid name, or any construction
    /// step failure (everything already constructed is unwound).
    pub fn create(
        &self,
        name: &str,
        image: &str,
        program: &str,
        limits: Option<ResourceLimits>,
    ) -> Result<ContainerId> {
        if name.is_empty() || name.len() > MAX_CONTAINER_NAME_LEN {
            return Err(RtainerError::Config {
                message: format!("container name must be 1..={MAX_CONTAINER_NAME_LEN} bytes"),
            });
        }
        let limits = limits.unwrap_or(ResourceLimits {
            memory_bytes: rtainer_common::constants::DEFAULT_MEMORY_LIMIT,
            cpu_quota_ticks: rtainer_common::constants::DEFAULT_CPU_QUOTA_TICKS,
        });

        let id = {
            let mut state = self.lock();
            if state.containers.len() >= MAX_CONTAINERS {
                return Err(RtainerError::Capacity {
                    resource: "container",
                });
            }
            state.next_id += 1;
            ContainerId::new(state.next_id)
        };

        let cgroup = self.isolation.cgroups.create(
            name,
            limits.memory_bytes,
            limits.cpu_quota_ticks,
            self.exec.now(),
        )?;
        let pid_namespace = match self.isolation.pid_namespaces.create(name) {
            Ok(ns) => ns,
            Err(e) => {
                let _ = self.isolation.cgroups.delete(cgroup);
                return Err(e);
            }
        };
        let ipc_namespace = match self.isolation.ipc.create_namespace(name) {
            Ok(ns) => ns,
            Err(e) => {
                let _ = self.isolation.pid_namespaces.delete(pid_namespace);
                let _ = self.isolation.cgroups.delete(cgroup);
                return Err(e);
            }
        };

        let image_path = ImageStore::image_path(image);
        if let Err(e) = codec::unpack(self.storage.as_ref(), &image_path, id) {
            let _ = self.isolation.ipc.delete_namespace(ipc_namespace);
            let _ = self.isolation.pid_namespaces.delete(pid_namespace);
            let _ = self.isolation.cgroups.delete(cgroup);
            return Err(e);
        }

        let container = Container {
            id,
            name: name.to_owned(),
            state: ContainerState::Stopped,
            task: None,
            image: image.to_owned(),
            program: program.to_owned(),
            root_dir: codec::container_dir(id),
            cgroup,
            pid_namespace,
            ipc_namespace,
            limits,
            gate: None,
        };

        let mut state = self.lock();
        if state.containers.len() >= MAX_CONTAINERS {
            drop(state);
            let _ = self.isolation.ipc.delete_namespace(ipc_namespace);
            let _ = self.isolation.pid_namespaces.delete(pid_namespace);
            let _ = self.isolation.cgroups.delete(cgroup);
            let _ = self.storage.remove_dir_all(&container.root_dir);
            return Err(RtainerError::Capacity {
                resource: "container",
            });
        }
        state.containers.push(container);
        tracing::info!(%id, name, image, "container created");
        Ok(id)
    }

    /// Starts a container: spawns its task inside the PID namespace, joins
    /// it to the cgroup, then releases the startup gate.
    ///
    /// # Errors
    ///
    /// Fails if the container is unknown or not stopped, or if task
    /// creation or cgroup binding fails (the container goes to ERROR in
    /// the latter case).
    pub fn start(&self, id: ContainerId) -> Result<()> {
        let mut state = self.lock();
        let container = find_mut(&mut state, id)?;
        if container.state != ContainerState::Stopped {
            return Err(RtainerError::InvalidState {
                message: format!("container {id} is {}, expected STOPPED", container.state),
            });
        }

        let gate = Arc::new(Gate::new());
        container.gate = Some(Arc::clone(&gate));
        let wrapper = self.wrapper(
            id,
            container.cgroup,
            container.pid_namespace,
            container.ipc_namespace,
            container.root_dir.clone(),
            container.program.clone(),
            Arc::clone(&gate),
        );
        let name = container.name.clone();
        let cgroup = container.cgroup;
        let pid_namespace = container.pid_namespace;

        // Two-step creation: spawn, then bind into the namespace. The task
        // is parked at the gate, so the bind is observable before any user
        // code runs.
        let task = match self.exec.spawn(&name, wrapper) {
            Ok(task) => task,
            Err(e) => {
                find_mut(&mut state, id)?.gate = None;
                return Err(e);
            }
        };
        if let Err(e) = self.isolation.pid_namespaces.add_task(pid_namespace, task) {
            let _ = self.exec.kill(task);
            find_mut(&mut state, id)?.gate = None;
            gate.release();
            return Err(e);
        }
        self.isolation.tasks.register(task);

        if let Err(e) = self.isolation.cgroups.add_task(cgroup, task) {
            let container = find_mut(&mut state, id)?;
            container.state = ContainerState::Error;
            container.gate = None;
            let _ = self.exec.kill(task);
            self.isolation.on_task_delete(task);
            gate.release();
            tracing::warn!(%id, error = %e, "cgroup join failed, container in ERROR");
            return Err(e);
        }

        let container = find_mut(&mut state, id)?;
        container.task = Some(task);
        container.state = ContainerState::Running;
        container.gate = None;
        // Isolation is fully applied; let the task proceed.
        gate.release();
        tracing::info!(%id, %task, "container started");
        Ok(())
    }

    /// Stops a running container and deletes its task. Stopping an
    /// already-stopped container fails.
    ///
    /// # Errors
    ///
    /// Fails if the container is unknown or not running.
    pub fn stop(&self, id: ContainerId) -> Result<()> {
        let mut state = self.lock();
        let container = find_mut(&mut state, id)?;
        if container.state != ContainerState::Running {
            return Err(RtainerError::InvalidState {
                message: format!("container {id} is {}, expected RUNNING", container.state),
            });
        }
        let cgroup = container.cgroup;
        if let Some(task) = container.task.take() {
            let _ = self.exec.kill(task);
            let _ = self.isolation.cgroups.remove_task(cgroup, task);
            self.isolation.on_task_delete(task);
        }
        let container = find_mut(&mut state, id)?;
        container.state = ContainerState::Stopped;
        tracing::info!(%id, "container stopped");
        Ok(())
    }

    /// Deletes a container: stops it if running, detaches it from the
    /// list, tears down its resource handles, and removes its directory.
    ///
    /// # Errors
    ///
    /// Fails if the container is unknown.
    pub fn delete(&self, id: ContainerId) -> Result<()> {
        let mut state = self.lock();
        let position = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| RtainerError::NotFound {
                kind: "container",
                id: id.to_string(),
            })?;

        let mut container = state.containers.remove(position);
        if container.state == ContainerState::Running {
            if let Some(task) = container.task.take() {
                let _ = self.exec.kill(task);
                let _ = self.isolation.cgroups.remove_task(container.cgroup, task);
                self.isolation.on_task_delete(task);
            }
        }
        drop(state);

        if let Err(e) = self.isolation.cgroups.delete(container.cgroup) {
            tracing::warn!(%id, error = %e, "cgroup teardown failed");
        }
        if let Err(e) = self.isolation.pid_namespaces.delete(container.pid_namespace) {
            tracing::warn!(%id, error = %e, "pid namespace teardown failed");
        }
        if let Err(e) = self.isolation.ipc.delete_namespace(container.ipc_namespace) {
            tracing::warn!(%id, error = %e, "ipc namespace teardown failed");
        }
        if let Err(e) = self.storage.remove_dir_all(&container.root_dir) {
            tracing::warn!(%id, error = %e, "container directory removal failed");
        }
        tracing::info!(%id, "container deleted");
        Ok(())
    }

    /// Creates and immediately starts a container.
    ///
    /// # Errors
    ///
    /// Fails if either step fails; a created container whose start failed
    /// stays in the list for inspection or deletion.
    pub fn run(
        &self,
        name: &str,
        image: &str,
        program: &str,
        limits: Option<ResourceLimits>,
    ) -> Result<ContainerId> {
        let id = self.create(name, image, program, limits)?;
        self.start(id)?;
        Ok(id)
    }

    /// Reconciliation pass: RUNNING containers whose task has exited are
    /// transitioned to STOPPED. Called periodically by the daemon.
    pub fn reconcile(&self) {
        let mut state = self.lock();
        for container in &mut state.containers {
            if container.state != ContainerState::Running {
                continue;
            }
            let Some(task) = container.task else { continue };
            if self.exec.task_state(task) == TaskState::Finished {
                container.task = None;
                container.state = ContainerState::Stopped;
                let _ = self.isolation.cgroups.remove_task(container.cgroup, task);
                self.isolation.on_task_delete(task);
                tracing::info!(id = %container.id, %task, "container task exited, reconciled to STOPPED");
            }
        }
    }

    /// Returns a snapshot of one container.
    ///
    /// # Errors
    ///
    /// Fails if the container is unknown.
    pub fn get(&self, id: ContainerId) -> Result<ContainerInfo> {
        let state = self.lock();
        let container = find(&state, id)?;
        Ok(ContainerInfo::from(container))
    }

    /// Returns snapshots of all containers, in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<ContainerInfo> {
        let state = self.lock();
        state.containers.iter().map(ContainerInfo::from).collect()
    }

    /// Looks a container up by exact name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<ContainerInfo> {
        let state = self.lock();
        state
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(ContainerInfo::from)
    }

    /// Number of containers in the list.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().containers.len()
    }

    /// Current cgroup statistics of a container.
    ///
    /// # Errors
    ///
    /// Fails if the container is unknown or its cgroup handle is stale.
    pub fn cgroup_stats(&self, id: ContainerId) -> Result<CGroupStats> {
        let cgroup = {
            let state = self.lock();
            find(&state, id)?.cgroup
        };
        self.isolation.cgroups.stats(cgroup)
    }

    /// The task-view filesystem this manager operates on.
    #[must_use]
    pub fn fs(&self) -> &TaskFs {
        &self.fs
    }

    #[allow(clippy::too_many_arguments)]
    fn wrapper(
        &self,
        id: ContainerId,
        cgroup: rtainer_core::cgroup::CGroupId,
        pid_namespace: rtainer_core::namespace::PidNamespaceId,
        ipc_namespace: rtainer_core::namespace::IpcNamespaceId,
        root_dir: String,
        program: String,
        gate: Arc<Gate>,
    ) -> Box<dyn FnOnce() + Send> {
        let isolation = Arc::clone(&self.isolation);
        let exec = Arc::clone(&self.exec);
        let fs = self.fs.clone();
        let loader = Arc::clone(&self.loader);
        let inner = Arc::clone(&self.inner);

        Box::new(move || {
            gate.wait();

            let ctx = WrapperCtx {
                id,
                cgroup,
                isolation,
                inner,
            };

            let Some(me) = exec.current_task() else {
                // No task context at all; nothing to clean up either.
                tracing::error!(%id, "container wrapper has no task context");
                return;
            };

            // The IPC namespace must be applied from the task's own
            // context.
            if ctx.isolation.ipc.set_task_namespace(me, ipc_namespace).is_err() {
                ctx.fail(me, "ipc namespace");
                return;
            }

            // Verify the construction path actually produced the expected
            // memberships before touching the filesystem or the loader.
            if ctx.isolation.cgroups.task_group(me) != Some(cgroup) {
                ctx.fail(me, "cgroup membership");
                return;
            }
            if ctx.isolation.pid_namespaces.task_namespace(me) != Some(pid_namespace) {
                ctx.fail(me, "pid namespace membership");
                return;
            }

            if fs.chroot(me, &root_dir).is_err() {
                ctx.fail(me, "chroot");
                return;
            }

            let program_path = format!("/{program}");
            let bytes = match fs.read(me, &program_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(%id, program, error = %e, "program load failed");
                    ctx.fail(me, "program load");
                    return;
                }
            };

            match loader.execute(&bytes) {
                Ok(()) => ctx.finish(me),
                Err(e) => {
                    tracing::warn!(%id, error = %e, "loader failed");
                    ctx.fail(me, "loader");
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn find<'a>(state: &'a ManagerState, id: ContainerId) -> Result<&'a Container> {
    state
        .containers
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| RtainerError::NotFound {
            kind: "container",
            id: id.to_string(),
        })
}

fn find_mut<'a>(state: &'a mut ManagerState, id: ContainerId) -> Result<&'a mut Container> {
    state
        .containers
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| RtainerError::NotFound {
            kind: "container",
            id: id.to_string(),
        })
}

// State the wrapper needs for its failure and completion transitions.
struct WrapperCtx {
    id: ContainerId,
    cgroup: rtainer_core::cgroup::CGroupId,
    isolation: Arc<Isolation>,
    inner: Arc<Mutex<ManagerState>>,
}

impl WrapperCtx {
    // Isolation verification or loader failure: container goes to ERROR
    // and the task self-deletes (the wrapper returns).
    fn fail(&self, me: TaskId, check: &'static str) {
        tracing::warn!(id = %self.id, check, "container task self-deleting");
        let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(container) = state.containers.iter_mut().find(|c| c.id == self.id) {
            if container.task == Some(me) {
                container.task = None;
                container.state = ContainerState::Error;
            }
        }
        drop(state);
        let _ = self.isolation.cgroups.remove_task(self.cgroup, me);
        self.isolation.on_task_delete(me);
    }

    // Normal completion of the program: the container transitions to
    // STOPPED.
    fn finish(&self, me: TaskId) {
        let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(container) = state.containers.iter_mut().find(|c| c.id == self.id) {
            if container.task == Some(me) {
                container.task = None;
                container.state = ContainerState::Stopped;
                tracing::info!(id = %self.id, "container program completed");
            }
        }
        drop(state);
        let _ = self.isolation.cgroups.remove_task(self.cgroup, me);
        self.isolation.on_task_delete(me);
    }
}
