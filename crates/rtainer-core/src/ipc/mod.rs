//! Namespace-aware IPC.
//!
//! The isolated constructors create a primitive, then register it with the
//! calling task's IPC namespace; registration failure drops the primitive
//! again so no unregistered object escapes. Every operation on an isolated
//! handle re-checks the caller's access against the registry.

pub mod primitives;

use std::sync::Arc;

use rtainer_common::error::Result;
use rtainer_common::types::TaskId;

use crate::namespace::ipc::{IpcNamespaceId, IpcObjectKind, IpcRegistry};

pub use primitives::{BitMode, EventGroup, Mutex, Queue, Semaphore, Wait};

fn caller_namespace(registry: &IpcRegistry, caller: TaskId) -> IpcNamespaceId {
    registry.task_namespace(caller).unwrap_or_else(|| registry.root())
}

/// A queue registered with an IPC namespace.
#[derive(Debug)]
pub struct IsolatedQueue<T> {
    queue: Queue<T>,
    registry: Arc<IpcRegistry>,
    namespace: IpcNamespaceId,
    object_id: u32,
}

impl<T> Clone for IsolatedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            registry: Arc::clone(&self.registry),
            namespace: self.namespace,
            object_id: self.object_id,
        }
    }
}

impl<T> IsolatedQueue<T> {
    /// Creates a queue and registers it with `caller`'s namespace.
    ///
    /// # Errors
    ///
    /// Fails if registration fails; the queue is dropped in that case.
    pub fn create(
        registry: &Arc<IpcRegistry>,
        caller: TaskId,
        capacity: usize,
        name: &str,
    ) -> Result<Self> {
        let namespace = caller_namespace(registry, caller);
        let queue = Queue::new(capacity);
        let object_id = registry.register(namespace, queue.key(), IpcObjectKind::Queue, name)?;
        Ok(Self {
            queue,
            registry: Arc::clone(registry),
            namespace,
            object_id,
        })
    }

    /// Enqueues an item on behalf of `caller`; returns false if access is
    /// denied or the queue stayed full.
    pub fn send(&self, caller: TaskId, item: T, wait: Wait) -> bool {
        if !self.registry.check_access(caller, self.queue.key()) {
            return false;
        }
        self.queue.send(item, wait)
    }

    /// Dequeues an item on behalf of `caller`; returns None if access is
    /// denied or the queue stayed empty.
    pub fn recv(&self, caller: TaskId, wait: Wait) -> Option<T> {
        if !self.registry.check_access(caller, self.queue.key()) {
            return None;
        }
        self.queue.recv(wait)
    }

    /// The namespace this queue is registered in.
    #[must_use]
    pub fn namespace(&self) -> IpcNamespaceId {
        self.namespace
    }

    /// The per-namespace object id.
    #[must_use]
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    /// Removes the registry entry; the queue itself stays usable through
    /// the compatibility path.
    ///
    /// # Errors
    ///
    /// Fails if the entry is already gone.
    pub fn unregister(&self) -> Result<()> {
        self.registry.unregister(self.namespace, self.queue.key())
    }
}

/// A semaphore registered with an IPC namespace.
#[derive(Debug, Clone)]
pub struct IsolatedSemaphore {
    semaphore: Semaphore,
    registry: Arc<IpcRegistry>,
    namespace: IpcNamespaceId,
    object_id: u32,
}

impl IsolatedSemaphore {
    /// Creates a binary semaphore and registers it with `caller`'s
    /// namespace.
    ///
    /// # Errors
    ///
    /// Fails if registration fails; the semaphore is dropped in that case.
    pub fn create_binary(registry: &Arc<IpcRegistry>, caller: TaskId, name: &str) -> Result<Self> {
        Self::create(registry, caller, Semaphore::binary(), name)
    }

    /// Creates a counting semaphore and registers it with `caller`'s
    /// namespace.
    ///
    /// # Errors
    ///
    /// Fails if registration fails; the semaphore is dropped in that case.
    pub fn create_counting(
        registry: &Arc<IpcRegistry>,
        caller: TaskId,
        max: u32,
        initial: u32,
        name: &str,
    ) -> Result<Self> {
        Self::create(registry, caller, Semaphore::counting(max, initial), name)
    }

    fn create(
        registry: &Arc<IpcRegistry>,
        caller: TaskId,
        semaphore: Semaphore,
        name: &str,
    ) -> Result<Self> {
        let namespace = caller_namespace(registry, caller);
        let object_id =
            registry.register(namespace, semaphore.key(), IpcObjectKind::Semaphore, name)?;
        Ok(Self {
            semaphore,
            registry: Arc::clone(registry),
            namespace,
            object_id,
        })
    }

    /// Takes one count on behalf of `caller`.
    pub fn take(&self, caller: TaskId, wait: Wait) -> bool {
        self.registry.check_access(caller, self.semaphore.key()) && self.semaphore.take(wait)
    }

    /// Gives one count on behalf of `caller`.
    pub fn give(&self, caller: TaskId) -> bool {
        self.registry.check_access(caller, self.semaphore.key()) && self.semaphore.give()
    }

    /// The per-namespace object id.
    #[must_use]
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    /// Removes the registry entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry is already gone.
    pub fn unregister(&self) -> Result<()> {
        self.registry.unregister(self.namespace, self.semaphore.key())
    }
}

/// A mutex registered with an IPC namespace.
#[derive(Debug, Clone)]
pub struct IsolatedMutex {
    mutex: Mutex,
    registry: Arc<IpcRegistry>,
    namespace: IpcNamespaceId,
    object_id: u32,
}

impl IsolatedMutex {
    /// Creates a mutex and registers it with `caller`'s namespace.
    ///
    /// # Errors
    ///
    /// Fails if registration fails; the mutex is dropped in that case.
    pub fn create(registry: &Arc<IpcRegistry>, caller: TaskId, name: &str) -> Result<Self> {
        let namespace = caller_namespace(registry, caller);
        let mutex = Mutex::new();
        let object_id = registry.register(namespace, mutex.key(), IpcObjectKind::Mutex, name)?;
        Ok(Self {
            mutex,
            registry: Arc::clone(registry),
            namespace,
            object_id,
        })
    }

    /// Acquires the lock on behalf of `caller`.
    pub fn lock(&self, caller: TaskId, wait: Wait) -> bool {
        self.registry.check_access(caller, self.mutex.key()) && self.mutex.lock(wait)
    }

    /// Releases the lock on behalf of `caller`.
    pub fn unlock(&self, caller: TaskId) -> bool {
        self.registry.check_access(caller, self.mutex.key()) && self.mutex.unlock()
    }

    /// The per-namespace object id.
    #[must_use]
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    /// Removes the registry entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry is already gone.
    pub fn unregister(&self) -> Result<()> {
        self.registry.unregister(self.namespace, self.mutex.key())
    }
}

/// An event group registered with an IPC namespace.
#[derive(Debug, Clone)]
pub struct IsolatedEventGroup {
    group: EventGroup,
    registry: Arc<IpcRegistry>,
    namespace: IpcNamespaceId,
    object_id: u32,
}

impl IsolatedEventGroup {
    /// Creates an event group and registers it with `caller`'s namespace.
    ///
    /// # Errors
    ///
    /// Fails if registration fails; the group is dropped in that case.
    pub fn create(registry: &Arc<IpcRegistry>, caller: TaskId, name: &str) -> Result<Self> {
        let namespace = caller_namespace(registry, caller);
        let group = EventGroup::new();
        let object_id =
            registry.register(namespace, group.key(), IpcObjectKind::EventGroup, name)?;
        Ok(Self {
            group,
            registry: Arc::clone(registry),
            namespace,
            object_id,
        })
    }

    /// Sets bits on behalf of `caller`; returns false if access is denied.
    pub fn set(&self, caller: TaskId, bits: u32) -> bool {
        if !self.registry.check_access(caller, self.group.key()) {
            return false;
        }
        self.group.set(bits);
        true
    }

    /// Waits for bits on behalf of `caller`.
    pub fn wait(
        &self,
        caller: TaskId,
        bits: u32,
        mode: BitMode,
        clear_on_exit: bool,
        wait: Wait,
    ) -> Option<u32> {
        if !self.registry.check_access(caller, self.group.key()) {
            return None;
        }
        self.group.wait(bits, mode, clear_on_exit, wait)
    }

    /// The per-namespace object id.
    #[must_use]
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    /// Removes the registry entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry is already gone.
    pub fn unregister(&self) -> Result<()> {
        self.registry.unregister(self.namespace, self.group.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtainer_common::constants::MAX_IPC_OBJECTS_PER_NAMESPACE;
    use rtainer_common::types::TaskId;

    fn registry() -> Arc<IpcRegistry> {
        Arc::new(IpcRegistry::new())
    }

    #[test]
    fn isolated_queue_registers_in_caller_namespace() {
        let registry = registry();
        let ns = registry.create_namespace("a").expect("create");
        let owner = TaskId::new(1);
        registry.set_task_namespace(owner, ns).expect("join");

        let queue: IsolatedQueue<u32> =
            IsolatedQueue::create(&registry, owner, 4, "work").expect("create queue");
        assert_eq!(queue.namespace(), ns);
        assert_eq!(registry.namespace_info(ns).expect("info").object_count, 1);
    }

    #[test]
    fn foreign_task_cannot_use_isolated_queue() {
        let registry = registry();
        let a = registry.create_namespace("a").expect("a");
        let b = registry.create_namespace("b").expect("b");
        let owner = TaskId::new(1);
        let intruder = TaskId::new(2);
        registry.set_task_namespace(owner, a).expect("join a");
        registry.set_task_namespace(intruder, b).expect("join b");

        let queue: IsolatedQueue<u32> =
            IsolatedQueue::create(&registry, owner, 4, "work").expect("create queue");
        assert!(queue.send(owner, 7, Wait::NoWait));
        assert!(!queue.send(intruder, 8, Wait::NoWait));
        assert_eq!(queue.recv(intruder, Wait::NoWait), None);
        assert_eq!(queue.recv(owner, Wait::NoWait), Some(7));
    }

    #[test]
    fn root_monitor_can_drain_foreign_queue() {
        let registry = registry();
        let a = registry.create_namespace("a").expect("a");
        let owner = TaskId::new(1);
        let monitor = TaskId::new(2);
        registry.set_task_namespace(owner, a).expect("join a");
        registry.set_task_namespace(monitor, registry.root()).expect("join root");

        let queue: IsolatedQueue<u32> =
            IsolatedQueue::create(&registry, owner, 4, "work").expect("create queue");
        assert!(queue.send(owner, 11, Wait::NoWait));
        assert_eq!(queue.recv(monitor, Wait::NoWait), Some(11));
    }

    #[test]
    fn registration_failure_rolls_the_object_back() {
        let registry = registry();
        let ns = registry.create_namespace("full").expect("create");
        let owner = TaskId::new(1);
        registry.set_task_namespace(owner, ns).expect("join");

        for i in 0..MAX_IPC_OBJECTS_PER_NAMESPACE {
            let queue: IsolatedQueue<u8> =
                IsolatedQueue::create(&registry, owner, 1, &format!("q{i}")).expect("create");
            // Keep the registry entries alive; the handles may drop.
            std::mem::forget(queue);
        }
        let err = IsolatedQueue::<u8>::create(&registry, owner, 1, "overflow");
        assert!(err.is_err());
        assert_eq!(
            registry.namespace_info(ns).expect("info").object_count,
            MAX_IPC_OBJECTS_PER_NAMESPACE
        );
    }

    #[test]
    fn semaphore_and_mutex_respect_namespaces() {
        let registry = registry();
        let a = registry.create_namespace("a").expect("a");
        let b = registry.create_namespace("b").expect("b");
        let owner = TaskId::new(1);
        let intruder = TaskId::new(2);
        registry.set_task_namespace(owner, a).expect("join a");
        registry.set_task_namespace(intruder, b).expect("join b");

        let semaphore =
            IsolatedSemaphore::create_binary(&registry, owner, "ready").expect("semaphore");
        assert!(semaphore.give(owner));
        assert!(!semaphore.take(intruder, Wait::NoWait));
        assert!(semaphore.take(owner, Wait::NoWait));

        let mutex = IsolatedMutex::create(&registry, owner, "lock").expect("mutex");
        assert!(!mutex.lock(intruder, Wait::NoWait));
        assert!(mutex.lock(owner, Wait::NoWait));
        assert!(mutex.unlock(owner));
    }

    #[test]
    fn event_group_respects_namespaces() {
        let registry = registry();
        let a = registry.create_namespace("a").expect("a");
        let b = registry.create_namespace("b").expect("b");
        let owner = TaskId::new(1);
        let intruder = TaskId::new(2);
        registry.set_task_namespace(owner, a).expect("join a");
        registry.set_task_namespace(intruder, b).expect("join b");

        let group = IsolatedEventGroup::create(&registry, owner, "flags").expect("group");
        assert!(!group.set(intruder, 0b1));
        assert!(group.set(owner, 0b1));
        assert_eq!(group.wait(intruder, 0b1, BitMode::Any, false, Wait::NoWait), None);
        assert_eq!(group.wait(owner, 0b1, BitMode::Any, false, Wait::NoWait), Some(0b1));
    }

    #[test]
    fn unregister_enables_namespace_teardown() {
        let registry = registry();
        let ns = registry.create_namespace("a").expect("create");
        let owner = TaskId::new(1);
        registry.set_task_namespace(owner, ns).expect("join");

        let queue: IsolatedQueue<u8> =
            IsolatedQueue::create(&registry, owner, 1, "q").expect("create");
        assert!(registry.delete_namespace(ns).is_err());
        queue.unregister().expect("unregister");
        registry.on_task_delete(owner);
        registry.delete_namespace(ns).expect("delete");
    }
}
