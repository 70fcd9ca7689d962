//! In-executive IPC primitives: queue, semaphore, mutex, event group.
//!
//! These are the blocking primitives the isolated constructors wrap. Waits
//! are tick-based; [`Wait::NoWait`] polls, [`Wait::Forever`] blocks until
//! the condition holds.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::{Duration, Instant};

use rtainer_common::constants::TICK_HZ;

use crate::namespace::ipc::IpcObjectKey;

/// How long a blocking IPC call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Fail immediately if the condition does not hold.
    NoWait,
    /// Wait up to the given number of ticks.
    Ticks(u64),
    /// Wait until the condition holds.
    Forever,
}

impl Wait {
    fn deadline(self) -> Option<Instant> {
        match self {
            Self::NoWait => Some(Instant::now()),
            Self::Ticks(ticks) => {
                Some(Instant::now() + Duration::from_millis(ticks.saturating_mul(1_000) / TICK_HZ))
            }
            Self::Forever => None,
        }
    }
}

// Shared wait loop: returns a guard for which `ready` holds, or None on
// timeout. Bounded only by the caller's deadline.
fn wait_until<'a, T>(
    lock: &'a StdMutex<T>,
    condvar: &Condvar,
    wait: Wait,
    mut ready: impl FnMut(&T) -> bool,
) -> Option<std::sync::MutexGuard<'a, T>> {
    let deadline = wait.deadline();
    let mut guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    loop {
        if ready(&guard) {
            return Some(guard);
        }
        match deadline {
            None => {
                guard = condvar
                    .wait(guard)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                let (next, _) = condvar
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                guard = next;
            }
        }
    }
}

#[derive(Debug)]
struct QueueShared<T> {
    capacity: usize,
    items: StdMutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// Bounded multi-producer multi-consumer queue.
#[derive(Debug)]
pub struct Queue<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Queue<T> {
    /// Creates a queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                capacity: capacity.max(1),
                items: StdMutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    /// Identity of this queue for namespace registration.
    #[must_use]
    pub fn key(&self) -> IpcObjectKey {
        IpcObjectKey(Arc::as_ptr(&self.shared).cast::<u8>() as usize)
    }

    /// Enqueues an item; returns false if the queue stayed full for the
    /// whole wait.
    pub fn send(&self, item: T, wait: Wait) -> bool {
        let capacity = self.shared.capacity;
        let Some(mut items) = wait_until(&self.shared.items, &self.shared.not_full, wait, |q| {
            q.len() < capacity
        }) else {
            return false;
        };
        items.push_back(item);
        drop(items);
        self.shared.not_empty.notify_one();
        true
    }

    /// Dequeues an item; returns None if the queue stayed empty for the
    /// whole wait.
    pub fn recv(&self, wait: Wait) -> Option<T> {
        let mut items =
            wait_until(&self.shared.items, &self.shared.not_empty, wait, |q| !q.is_empty())?;
        let item = items.pop_front();
        drop(items);
        self.shared.not_full.notify_one();
        item
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct SemaphoreShared {
    max: u32,
    count: StdMutex<u32>,
    released: Condvar,
}

/// Counting semaphore; binary when `max == 1`.
#[derive(Debug, Clone)]
pub struct Semaphore {
    shared: Arc<SemaphoreShared>,
}

impl Semaphore {
    /// Creates a counting semaphore.
    #[must_use]
    pub fn counting(max: u32, initial: u32) -> Self {
        Self {
            shared: Arc::new(SemaphoreShared {
                max: max.max(1),
                count: StdMutex::new(initial.min(max)),
                released: Condvar::new(),
            }),
        }
    }

    /// Creates a binary semaphore, initially empty.
    #[must_use]
    pub fn binary() -> Self {
        Self::counting(1, 0)
    }

    /// Identity of this semaphore for namespace registration.
    #[must_use]
    pub fn key(&self) -> IpcObjectKey {
        IpcObjectKey(Arc::as_ptr(&self.shared).cast::<u8>() as usize)
    }

    /// Takes one count; returns false on timeout.
    pub fn take(&self, wait: Wait) -> bool {
        let Some(mut count) =
            wait_until(&self.shared.count, &self.shared.released, wait, |c| *c > 0)
        else {
            return false;
        };
        *count -= 1;
        true
    }

    /// Gives one count back; returns false if already at the maximum.
    pub fn give(&self) -> bool {
        let mut count = self
            .shared
            .count
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *count >= self.shared.max {
            return false;
        }
        *count += 1;
        drop(count);
        self.shared.released.notify_one();
        true
    }
}

/// Mutual-exclusion lock built on a binary semaphore, created unlocked.
#[derive(Debug, Clone)]
pub struct Mutex {
    semaphore: Semaphore,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            semaphore: Semaphore::counting(1, 1),
        }
    }

    /// Identity of this mutex for namespace registration.
    #[must_use]
    pub fn key(&self) -> IpcObjectKey {
        self.semaphore.key()
    }

    /// Acquires the lock; returns false on timeout.
    pub fn lock(&self, wait: Wait) -> bool {
        self.semaphore.take(wait)
    }

    /// Releases the lock; returns false if it was not held.
    pub fn unlock(&self) -> bool {
        self.semaphore.give()
    }
}

/// How an event-group wait combines its requested bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    /// Wake when any requested bit is set.
    Any,
    /// Wake only when all requested bits are set.
    All,
}

#[derive(Debug)]
struct EventGroupShared {
    bits: StdMutex<u32>,
    changed: Condvar,
}

/// Group of 32 event flags.
#[derive(Debug, Clone)]
pub struct EventGroup {
    shared: Arc<EventGroupShared>,
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGroup {
    /// Creates an event group with all bits clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EventGroupShared {
                bits: StdMutex::new(0),
                changed: Condvar::new(),
            }),
        }
    }

    /// Identity of this group for namespace registration.
    #[must_use]
    pub fn key(&self) -> IpcObjectKey {
        IpcObjectKey(Arc::as_ptr(&self.shared).cast::<u8>() as usize)
    }

    /// Sets bits and wakes waiters.
    pub fn set(&self, bits: u32) {
        let mut current = self
            .shared
            .bits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current |= bits;
        drop(current);
        self.shared.changed.notify_all();
    }

    /// Clears bits.
    pub fn clear(&self, bits: u32) {
        let mut current = self
            .shared
            .bits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current &= !bits;
    }

    /// Waits for the requested bits; returns the bit state at wake, or
    /// None on timeout. `clear_on_exit` clears the requested bits before
    /// returning.
    pub fn wait(&self, bits: u32, mode: BitMode, clear_on_exit: bool, wait: Wait) -> Option<u32> {
        let satisfied = |current: &u32| match mode {
            BitMode::Any => *current & bits != 0,
            BitMode::All => *current & bits == bits,
        };
        let mut current = wait_until(&self.shared.bits, &self.shared.changed, wait, satisfied)?;
        let snapshot = *current;
        if clear_on_exit {
            *current &= !bits;
        }
        Some(snapshot)
    }
}
