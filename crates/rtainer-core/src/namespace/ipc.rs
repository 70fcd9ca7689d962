//! IPC namespace isolation.
//!
//! A flat registry of IPC object entries, each tagged with its owning
//! namespace. Access is allowed when the caller's namespace matches the
//! entry's, when the caller is in the root namespace (administrative
//! override), or when the object was never registered (compatibility path
//! for objects created outside the isolated constructors).

use std::collections::HashMap;
use std::sync::Mutex;

use rtainer_common::constants::{MAX_IPC_NAMESPACES, MAX_IPC_OBJECTS_PER_NAMESPACE};
use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::TaskId;

/// Handle to an IPC namespace slot, invalidated by slot reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpcNamespaceId {
    slot: usize,
    generation: u64,
}

/// Identity of a registered IPC object (derived from its shared state
/// allocation; stable for the object's lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpcObjectKey(pub(crate) usize);

/// Kind of a registered IPC object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpcObjectKind {
    /// Bounded message queue.
    Queue,
    /// Counting or binary semaphore.
    Semaphore,
    /// Mutual-exclusion lock.
    Mutex,
    /// Event-flag group.
    EventGroup,
}

/// Point-in-time information about a namespace.
#[derive(Debug, Clone, Copy)]
pub struct IpcNamespaceInfo {
    /// Number of registered objects.
    pub object_count: usize,
    /// Next per-namespace object id that will be issued.
    pub next_object_id: u32,
}

#[derive(Debug)]
struct ObjectEntry {
    key: IpcObjectKey,
    kind: IpcObjectKind,
    name: String,
    object_id: u32,
}

#[derive(Debug)]
struct IpcNamespace {
    name: String,
    ns_id: u32,
    next_object_id: u32,
    objects: Vec<ObjectEntry>,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    namespace: Option<IpcNamespace>,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Slot>,
    next_ns_id: u32,
    // Per-task namespace membership; tasks absent here behave as root.
    memberships: HashMap<TaskId, IpcNamespaceId>,
}

/// The IPC namespace registry. One instance per executive, shared with
/// every isolated IPC handle.
#[derive(Debug)]
pub struct IpcRegistry {
    inner: Mutex<Inner>,
    root: IpcNamespaceId,
}

impl Default for IpcRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcRegistry {
    /// Creates the registry and its root namespace.
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..MAX_IPC_NAMESPACES)
            .map(|_| Slot {
                generation: 0,
                namespace: None,
            })
            .collect();
        let registry = Self {
            inner: Mutex::new(Inner {
                slots,
                next_ns_id: 1,
                memberships: HashMap::new(),
            }),
            root: IpcNamespaceId {
                slot: 0,
                generation: 1,
            },
        };
        let root = registry
            .create_namespace("root")
            .unwrap_or_else(|_| unreachable!("empty table has a free slot"));
        debug_assert_eq!(root, registry.root);
        registry
    }

    /// Returns the root namespace handle.
    #[must_use]
    pub fn root(&self) -> IpcNamespaceId {
        self.root
    }

    /// Creates a namespace.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty or no slot is free.
    pub fn create_namespace(&self, name: &str) -> Result<IpcNamespaceId> {
        if name.is_empty() {
            return Err(RtainerError::Config {
                message: "ipc namespace name must not be empty".into(),
            });
        }
        let mut inner = self.lock();
        let slot = inner
            .slots
            .iter()
            .position(|s| s.namespace.is_none())
            .ok_or(RtainerError::Capacity {
                resource: "ipc namespace",
            })?;
        inner.slots[slot].generation += 1;
        let generation = inner.slots[slot].generation;
        let ns_id = inner.next_ns_id;
        inner.next_ns_id += 1;
        inner.slots[slot].namespace = Some(IpcNamespace {
            name: name.to_owned(),
            ns_id,
            next_object_id: 1,
            objects: Vec::new(),
        });
        tracing::info!(name, ns_id, slot, "ipc namespace created");
        Ok(IpcNamespaceId { slot, generation })
    }

    /// Deletes a namespace and frees its slot.
    ///
    /// # Errors
    ///
    /// Fails for the root namespace, a stale handle, or a namespace with
    /// registered objects (the caller must unregister them first).
    pub fn delete_namespace(&self, id: IpcNamespaceId) -> Result<()> {
        if id == self.root {
            return Err(RtainerError::Invariant {
                message: "the root ipc namespace cannot be deleted".into(),
            });
        }
        let mut inner = self.lock();
        let namespace = resolve(&inner, id)?;
        if !namespace.objects.is_empty() {
            return Err(RtainerError::Invariant {
                message: format!(
                    "ipc namespace '{}' still has registered objects",
                    namespace.name
                ),
            });
        }
        let name = namespace.name.clone();
        inner.slots[id.slot].namespace = None;
        inner.memberships.retain(|_, ns| *ns != id);
        tracing::info!(name, slot = id.slot, "ipc namespace deleted");
        Ok(())
    }

    /// Registers an object in a namespace and issues its per-namespace
    /// object id.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale, the namespace is at object capacity,
    /// or the object is already registered somewhere.
    pub fn register(
        &self,
        id: IpcNamespaceId,
        key: IpcObjectKey,
        kind: IpcObjectKind,
        name: &str,
    ) -> Result<u32> {
        let mut inner = self.lock();
        resolve(&inner, id)?;
        let duplicate = inner
            .slots
            .iter()
            .filter_map(|s| s.namespace.as_ref())
            .any(|ns| ns.objects.iter().any(|o| o.key == key));
        if duplicate {
            return Err(RtainerError::Invariant {
                message: "ipc object is already registered".into(),
            });
        }
        let namespace = resolve_mut(&mut inner, id)?;
        if namespace.objects.len() >= MAX_IPC_OBJECTS_PER_NAMESPACE {
            return Err(RtainerError::Capacity {
                resource: "ipc object",
            });
        }
        let object_id = namespace.next_object_id;
        namespace.next_object_id += 1;
        namespace.objects.push(ObjectEntry {
            key,
            kind,
            name: name.to_owned(),
            object_id,
        });
        tracing::debug!(name, object_id, ns = namespace.name, ?kind, "ipc object registered");
        Ok(object_id)
    }

    /// Removes an object's registry entry.
    ///
    /// # Errors
    ///
    /// Fails if the object is not registered in this namespace.
    pub fn unregister(&self, id: IpcNamespaceId, key: IpcObjectKey) -> Result<()> {
        let mut inner = self.lock();
        let namespace = resolve_mut(&mut inner, id)?;
        let position = namespace
            .objects
            .iter()
            .position(|o| o.key == key)
            .ok_or_else(|| RtainerError::NotFound {
                kind: "ipc object",
                id: format!("{key:?}"),
            })?;
        let entry = namespace.objects.swap_remove(position);
        tracing::debug!(name = entry.name, ns = namespace.name, "ipc object unregistered");
        Ok(())
    }

    /// Looks an object up by its per-namespace id.
    #[must_use]
    pub fn find_object(&self, id: IpcNamespaceId, object_id: u32) -> Option<(IpcObjectKey, IpcObjectKind)> {
        if object_id == 0 {
            return None;
        }
        let inner = self.lock();
        let namespace = resolve(&inner, id).ok()?;
        namespace
            .objects
            .iter()
            .find(|o| o.object_id == object_id)
            .map(|o| (o.key, o.kind))
    }

    /// Access check: whether `task` may operate on the object behind
    /// `key`. Unregistered objects are always accessible; registered ones
    /// require matching namespaces, with the root namespace allowed
    /// everywhere.
    #[must_use]
    pub fn check_access(&self, task: TaskId, key: IpcObjectKey) -> bool {
        let inner = self.lock();
        let task_ns = inner.memberships.get(&task).copied().unwrap_or(self.root);
        for (slot, s) in inner.slots.iter().enumerate() {
            let Some(ns) = s.namespace.as_ref() else { continue };
            if ns.objects.iter().any(|o| o.key == key) {
                let owner = IpcNamespaceId {
                    slot,
                    generation: s.generation,
                };
                return owner == task_ns || task_ns == self.root;
            }
        }
        true
    }

    /// Assigns a task to a namespace. Must be called from the task's own
    /// context during container startup.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn set_task_namespace(&self, task: TaskId, id: IpcNamespaceId) -> Result<()> {
        let mut inner = self.lock();
        resolve(&inner, id)?;
        let _ = inner.memberships.insert(task, id);
        tracing::debug!(%task, slot = id.slot, "task joined ipc namespace");
        Ok(())
    }

    /// Returns the namespace a task belongs to, if explicitly assigned.
    #[must_use]
    pub fn task_namespace(&self, task: TaskId) -> Option<IpcNamespaceId> {
        let inner = self.lock();
        inner.memberships.get(&task).copied()
    }

    /// Returns namespace information.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn namespace_info(&self, id: IpcNamespaceId) -> Result<IpcNamespaceInfo> {
        let inner = self.lock();
        let namespace = resolve(&inner, id)?;
        Ok(IpcNamespaceInfo {
            object_count: namespace.objects.len(),
            next_object_id: namespace.next_object_id,
        })
    }

    /// Returns the namespace's numeric id.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn numeric_id(&self, id: IpcNamespaceId) -> Result<u32> {
        let inner = self.lock();
        Ok(resolve(&inner, id)?.ns_id)
    }

    /// Task-delete hook: drops the task's namespace membership. Registered
    /// objects are system-owned and stay registered.
    pub fn on_task_delete(&self, task: TaskId) {
        let mut inner = self.lock();
        let _ = inner.memberships.remove(&task);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn resolve(inner: &Inner, id: IpcNamespaceId) -> Result<&IpcNamespace> {
    let slot = inner.slots.get(id.slot).ok_or(RtainerError::StaleHandle {
        kind: "ipc namespace",
    })?;
    if slot.generation != id.generation {
        return Err(RtainerError::StaleHandle {
            kind: "ipc namespace",
        });
    }
    slot.namespace.as_ref().ok_or(RtainerError::StaleHandle {
        kind: "ipc namespace",
    })
}

fn resolve_mut(inner: &mut Inner, id: IpcNamespaceId) -> Result<&mut IpcNamespace> {
    let slot = inner.slots.get_mut(id.slot).ok_or(RtainerError::StaleHandle {
        kind: "ipc namespace",
    })?;
    if slot.generation != id.generation {
        return Err(RtainerError::StaleHandle {
            kind: "ipc namespace",
        });
    }
    slot.namespace.as_mut().ok_or(RtainerError::StaleHandle {
        kind: "ipc namespace",
    })
}
