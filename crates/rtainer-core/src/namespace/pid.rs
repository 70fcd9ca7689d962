//! PID namespace isolation.
//!
//! Each namespace issues virtual PIDs starting at 1, monotonically and
//! without recycling, up to [`PID_NAMESPACE_MAX_PID`]. Lookups scan only
//! within one namespace, so the same virtual PID in two namespaces
//! resolves to two different tasks. The root namespace is created at
//! initialization and cannot be deleted.

use std::sync::Mutex;

use rtainer_common::constants::{MAX_PID_NAMESPACES, PID_NAMESPACE_MAX_PID};
use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::TaskId;

/// Handle to a PID namespace slot, invalidated by slot reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PidNamespaceId {
    slot: usize,
    generation: u64,
}

/// Point-in-time information about a namespace.
#[derive(Debug, Clone, Copy)]
pub struct PidNamespaceInfo {
    /// Number of member tasks.
    pub task_count: usize,
    /// Next virtual PID that will be issued.
    pub next_pid: u32,
    /// Highest virtual PID this namespace will ever issue.
    pub max_pid: u32,
}

#[derive(Debug)]
struct PidNamespace {
    name: String,
    ns_id: u32,
    next_pid: u32,
    max_pid: u32,
    // (virtual pid, task) pairs, bounded by max_pid allocations.
    members: Vec<(u32, TaskId)>,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    namespace: Option<PidNamespace>,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Slot>,
    next_ns_id: u32,
}

/// The PID namespace table. One instance per executive.
#[derive(Debug)]
pub struct PidNamespaceSet {
    inner: Mutex<Inner>,
    root: PidNamespaceId,
}

impl Default for PidNamespaceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PidNamespaceSet {
    /// Creates the table and its root namespace.
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..MAX_PID_NAMESPACES)
            .map(|_| Slot {
                generation: 0,
                namespace: None,
            })
            .collect();
        let set = Self {
            inner: Mutex::new(Inner {
                slots,
                next_ns_id: 1,
            }),
            root: PidNamespaceId {
                slot: 0,
                generation: 1,
            },
        };
        let root = set.create("root").unwrap_or_else(|_| unreachable!("empty table has a free slot"));
        debug_assert_eq!(root, set.root);
        set
    }

    /// Returns the root namespace handle.
    #[must_use]
    pub fn root(&self) -> PidNamespaceId {
        self.root
    }

    /// Creates a namespace.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty or no slot is free.
    pub fn create(&self, name: &str) -> Result<PidNamespaceId> {
        if name.is_empty() {
            return Err(RtainerError::Config {
                message: "pid namespace name must not be empty".into(),
            });
        }
        let mut inner = self.lock();
        let slot = inner
            .slots
            .iter()
            .position(|s| s.namespace.is_none())
            .ok_or(RtainerError::Capacity {
                resource: "pid namespace",
            })?;
        inner.slots[slot].generation += 1;
        let generation = inner.slots[slot].generation;
        let ns_id = inner.next_ns_id;
        inner.next_ns_id += 1;
        inner.slots[slot].namespace = Some(PidNamespace {
            name: name.to_owned(),
            ns_id,
            next_pid: 1,
            max_pid: PID_NAMESPACE_MAX_PID,
            members: Vec::new(),
        });
        tracing::info!(name, ns_id, slot, "pid namespace created");
        Ok(PidNamespaceId { slot, generation })
    }

    /// Deletes a namespace and frees its slot.
    ///
    /// # Errors
    ///
    /// Fails for the root namespace, a stale handle, or a namespace that
    /// still has member tasks.
    pub fn delete(&self, id: PidNamespaceId) -> Result<()> {
        if id == self.root {
            return Err(RtainerError::Invariant {
                message: "the root pid namespace cannot be deleted".into(),
            });
        }
        let mut inner = self.lock();
        let namespace = resolve(&inner, id)?;
        if !namespace.members.is_empty() {
            return Err(RtainerError::Invariant {
                message: format!("pid namespace '{}' still has member tasks", namespace.name),
            });
        }
        let name = namespace.name.clone();
        inner.slots[id.slot].namespace = None;
        tracing::info!(name, slot = id.slot, "pid namespace deleted");
        Ok(())
    }

    /// Adds a task to a namespace, issuing the next virtual PID.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale, the task already belongs to a
    /// namespace, or the namespace has exhausted its PID range.
    pub fn add_task(&self, id: PidNamespaceId, task: TaskId) -> Result<u32> {
        let mut inner = self.lock();
        resolve(&inner, id)?;
        let already_bound = inner
            .slots
            .iter()
            .filter_map(|s| s.namespace.as_ref())
            .any(|ns| ns.members.iter().any(|(_, t)| *t == task));
        if already_bound {
            return Err(RtainerError::Invariant {
                message: format!("{task} already belongs to a pid namespace"),
            });
        }
        let namespace = resolve_mut(&mut inner, id)?;
        if namespace.next_pid > namespace.max_pid {
            return Err(RtainerError::Capacity {
                resource: "virtual pid",
            });
        }
        let pid = namespace.next_pid;
        namespace.next_pid += 1;
        namespace.members.push((pid, task));
        tracing::debug!(%task, pid, ns = namespace.name, "task added to pid namespace");
        Ok(pid)
    }

    /// Removes a task from a namespace. The virtual PID is not recycled.
    ///
    /// # Errors
    ///
    /// Fails if the task does not belong to this namespace.
    pub fn remove_task(&self, id: PidNamespaceId, task: TaskId) -> Result<()> {
        let mut inner = self.lock();
        let namespace = resolve_mut(&mut inner, id)?;
        let position = namespace
            .members
            .iter()
            .position(|(_, t)| *t == task)
            .ok_or_else(|| RtainerError::Invariant {
                message: format!("{task} does not belong to this pid namespace"),
            })?;
        namespace.members.swap_remove(position);
        tracing::debug!(%task, ns = namespace.name, "task removed from pid namespace");
        Ok(())
    }

    /// Returns the virtual PID of a task, if it belongs to any namespace.
    #[must_use]
    pub fn virtual_pid(&self, task: TaskId) -> Option<u32> {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .filter_map(|s| s.namespace.as_ref())
            .find_map(|ns| ns.members.iter().find(|(_, t)| *t == task).map(|(p, _)| *p))
    }

    /// Returns the namespace a task belongs to, if any.
    #[must_use]
    pub fn task_namespace(&self, task: TaskId) -> Option<PidNamespaceId> {
        let inner = self.lock();
        inner.slots.iter().enumerate().find_map(|(slot, s)| {
            let ns = s.namespace.as_ref()?;
            ns.members.iter().any(|(_, t)| *t == task).then_some(PidNamespaceId {
                slot,
                generation: s.generation,
            })
        })
    }

    /// Looks a task up by virtual PID within one namespace only.
    #[must_use]
    pub fn find_task(&self, id: PidNamespaceId, pid: u32) -> Option<TaskId> {
        if pid == 0 {
            return None;
        }
        let inner = self.lock();
        let namespace = resolve(&inner, id).ok()?;
        namespace
            .members
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, t)| *t)
    }

    /// Returns namespace information.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn info(&self, id: PidNamespaceId) -> Result<PidNamespaceInfo> {
        let inner = self.lock();
        let namespace = resolve(&inner, id)?;
        Ok(PidNamespaceInfo {
            task_count: namespace.members.len(),
            next_pid: namespace.next_pid,
            max_pid: namespace.max_pid,
        })
    }

    /// Returns the namespace's numeric id.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn numeric_id(&self, id: PidNamespaceId) -> Result<u32> {
        let inner = self.lock();
        Ok(resolve(&inner, id)?.ns_id)
    }

    /// Task-delete hook: removes the task from its namespace, if any.
    pub fn on_task_delete(&self, task: TaskId) {
        if let Some(id) = self.task_namespace(task) {
            let _ = self.remove_task(id, task);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn resolve(inner: &Inner, id: PidNamespaceId) -> Result<&PidNamespace> {
    let slot = inner.slots.get(id.slot).ok_or(RtainerError::StaleHandle {
        kind: "pid namespace",
    })?;
    if slot.generation != id.generation {
        return Err(RtainerError::StaleHandle {
            kind: "pid namespace",
        });
    }
    slot.namespace.as_ref().ok_or(RtainerError::StaleHandle {
        kind: "pid namespace",
    })
}

fn resolve_mut(inner: &mut Inner, id: PidNamespaceId) -> Result<&mut PidNamespace> {
    let slot = inner.slots.get_mut(id.slot).ok_or(RtainerError::StaleHandle {
        kind: "pid namespace",
    })?;
    if slot.generation != id.generation {
        return Err(RtainerError::StaleHandle {
            kind: "pid namespace",
        });
    }
    slot.namespace.as_mut().ok_or(RtainerError::StaleHandle {
        kind: "pid namespace",
    })
}
