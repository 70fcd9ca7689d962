//! CGroup controller: memory and CPU-time quotas over groups of tasks.
//!
//! A fixed array of slots holds the cgroups; a bounded mapping table binds
//! tasks to at most one cgroup each. All accounting is driven by the tick
//! hook, which charges exactly the cgroup of the task that was running at
//! tick time. Handles carry a generation counter so a handle to a deleted
//! slot is detected as stale instead of aliasing a reused slot.

pub mod cpu;
pub mod memory;

use std::sync::Mutex;

use rtainer_common::constants::{CPU_WINDOW_TICKS, MAX_CGROUPS, MAX_TASKS_PER_CGROUP};
use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::{TaskId, Tick};

use self::cpu::CpuBudget;
use self::memory::MemoryStats;

/// Handle to a cgroup slot, invalidated by slot reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CGroupId {
    slot: usize,
    generation: u64,
}

/// Point-in-time statistics of a cgroup.
#[derive(Debug, Clone, Copy)]
pub struct CGroupStats {
    /// Memory accounting.
    pub memory: MemoryStats,
    /// CPU budget state.
    pub cpu: CpuBudget,
    /// Number of bound tasks.
    pub task_count: usize,
}

#[derive(Debug)]
struct CGroup {
    name: String,
    memory: MemoryStats,
    cpu: CpuBudget,
    task_count: usize,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    group: Option<CGroup>,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Slot>,
    // Task-to-cgroup bindings; a task appears at most once.
    bindings: Vec<(TaskId, CGroupId)>,
}

/// The cgroup table. One instance per executive.
#[derive(Debug)]
pub struct CGroupSet {
    inner: Mutex<Inner>,
}

impl Default for CGroupSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CGroupSet {
    /// Creates an empty cgroup table with [`MAX_CGROUPS`] slots.
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..MAX_CGROUPS)
            .map(|_| Slot {
                generation: 0,
                group: None,
            })
            .collect();
        Self {
            inner: Mutex::new(Inner {
                slots,
                bindings: Vec::new(),
            }),
        }
    }

    /// Creates a cgroup with the given limits, starting its first CPU
    /// window at `now`.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty or no slot is free.
    pub fn create(
        &self,
        name: &str,
        memory_limit: u64,
        cpu_quota_ticks: u32,
        now: Tick,
    ) -> Result<CGroupId> {
        if name.is_empty() {
            return Err(RtainerError::Config {
                message: "cgroup name must not be empty".into(),
            });
        }
        let mut inner = self.lock();
        let slot = inner
            .slots
            .iter()
            .position(|s| s.group.is_none())
            .ok_or(RtainerError::Capacity { resource: "cgroup" })?;
        inner.slots[slot].generation += 1;
        let generation = inner.slots[slot].generation;
        inner.slots[slot].group = Some(CGroup {
            name: name.to_owned(),
            memory: MemoryStats::new(memory_limit),
            cpu: CpuBudget::new(cpu_quota_ticks, now, CPU_WINDOW_TICKS),
            task_count: 0,
        });
        tracing::info!(name, slot, memory_limit, cpu_quota_ticks, "cgroup created");
        Ok(CGroupId { slot, generation })
    }

    /// Deletes a cgroup and frees its slot.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale or tasks are still bound.
    pub fn delete(&self, id: CGroupId) -> Result<()> {
        let mut inner = self.lock();
        let group = resolve(&inner, id)?;
        if group.task_count > 0 {
            return Err(RtainerError::Invariant {
                message: format!("cgroup '{}' still has bound tasks", group.name),
            });
        }
        let name = group.name.clone();
        inner.slots[id.slot].group = None;
        tracing::info!(name, slot = id.slot, "cgroup deleted");
        Ok(())
    }

    /// Binds a task to a cgroup.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale, the task is already bound elsewhere,
    /// or the mapping table is full.
    pub fn add_task(&self, id: CGroupId, task: TaskId) -> Result<()> {
        let mut inner = self.lock();
        resolve(&inner, id)?;
        if inner.bindings.iter().any(|(t, _)| *t == task) {
            return Err(RtainerError::Invariant {
                message: format!("{task} is already bound to a cgroup"),
            });
        }
        if inner.bindings.len() >= MAX_CGROUPS * MAX_TASKS_PER_CGROUP {
            return Err(RtainerError::Capacity {
                resource: "cgroup binding",
            });
        }
        inner.bindings.push((task, id));
        resolve_mut(&mut inner, id)?.task_count += 1;
        tracing::debug!(%task, slot = id.slot, "task bound to cgroup");
        Ok(())
    }

    /// Unbinds a task from a cgroup.
    ///
    /// # Errors
    ///
    /// Fails if the task is not bound to this cgroup (it may be bound to
    /// another one).
    pub fn remove_task(&self, id: CGroupId, task: TaskId) -> Result<()> {
        let mut inner = self.lock();
        resolve(&inner, id)?;
        let position = inner
            .bindings
            .iter()
            .position(|(t, g)| *t == task && *g == id)
            .ok_or_else(|| RtainerError::Invariant {
                message: format!("{task} is not bound to this cgroup"),
            })?;
        inner.bindings.swap_remove(position);
        resolve_mut(&mut inner, id)?.task_count -= 1;
        tracing::debug!(%task, slot = id.slot, "task unbound from cgroup");
        Ok(())
    }

    /// Returns the cgroup a task is bound to, if any.
    #[must_use]
    pub fn task_group(&self, task: TaskId) -> Option<CGroupId> {
        let inner = self.lock();
        inner
            .bindings
            .iter()
            .find(|(t, _)| *t == task)
            .map(|(_, g)| *g)
    }

    /// Returns whether an allocation of `size` bytes by `task` is
    /// admissible. Unbound tasks and sentinel limits always admit.
    #[must_use]
    pub fn check_memory(&self, task: TaskId, size: u64) -> bool {
        let inner = self.lock();
        match binding(&inner, task) {
            Some(group) => group.memory.admits(size),
            None => true,
        }
    }

    /// Applies a signed memory delta for `task`. A delta for an unbound
    /// task is a successful no-op; deallocation clamps at zero.
    pub fn update_memory(&self, task: TaskId, delta: i64) {
        let mut inner = self.lock();
        let Some(id) = inner.bindings.iter().find(|(t, _)| *t == task).map(|(_, g)| *g) else {
            return;
        };
        if let Ok(group) = resolve_mut(&mut inner, id) {
            group.memory.apply(delta);
        }
    }

    /// Returns current statistics for a cgroup.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn stats(&self, id: CGroupId) -> Result<CGroupStats> {
        let inner = self.lock();
        let group = resolve(&inner, id)?;
        Ok(CGroupStats {
            memory: group.memory,
            cpu: group.cpu,
            task_count: group.task_count,
        })
    }

    /// Returns the cgroup's name.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn name(&self, id: CGroupId) -> Result<String> {
        let inner = self.lock();
        Ok(resolve(&inner, id)?.name.clone())
    }

    /// Returns the `(used, limit, peak)` memory triple.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn memory_info(&self, id: CGroupId) -> Result<(u64, u64, u64)> {
        let inner = self.lock();
        let group = resolve(&inner, id)?;
        Ok((group.memory.used, group.memory.limit, group.memory.peak))
    }

    /// Replaces the memory limit.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn set_memory_limit(&self, id: CGroupId, limit: u64) -> Result<()> {
        let mut inner = self.lock();
        resolve_mut(&mut inner, id)?.memory.limit = limit;
        Ok(())
    }

    /// Replaces the CPU quota (ticks per window).
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn set_cpu_quota(&self, id: CGroupId, quota_ticks: u32) -> Result<()> {
        let mut inner = self.lock();
        resolve_mut(&mut inner, id)?.cpu.quota_ticks = quota_ticks;
        Ok(())
    }

    /// Resets memory usage and peak; the limit is kept.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale.
    pub fn reset_memory_stats(&self, id: CGroupId) -> Result<()> {
        let mut inner = self.lock();
        resolve_mut(&mut inner, id)?.memory.reset();
        Ok(())
    }

    /// Sums memory usage across all active cgroups.
    #[must_use]
    pub fn total_memory(&self) -> u64 {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .filter_map(|s| s.group.as_ref())
            .map(|g| g.memory.used)
            .sum()
    }

    /// Admission check consulted by the scheduler before dispatching
    /// `task`. Unbound tasks always run.
    #[must_use]
    pub fn can_run(&self, task: TaskId) -> bool {
        let inner = self.lock();
        match binding(&inner, task) {
            Some(group) => group.cpu.admits(),
            None => true,
        }
    }

    /// Tick hook: charges one tick to the cgroup of the currently running
    /// task, then advances every cgroup's window/penalty state.
    ///
    /// A scheduler honouring [`Self::can_run`] never dispatches a gated
    /// task; the charge re-checks admission anyway so a host that cannot
    /// preempt mid-window does not overshoot the quota or inflate the
    /// rollover penalty.
    ///
    /// Runs in interrupt context; the loop is bounded by [`MAX_CGROUPS`].
    pub fn on_tick(&self, now: Tick, current: Option<TaskId>) {
        let mut inner = self.lock();
        if let Some(task) = current {
            if let Some(id) = inner.bindings.iter().find(|(t, _)| *t == task).map(|(_, g)| *g) {
                if let Ok(group) = resolve_mut(&mut inner, id) {
                    if group.cpu.admits() {
                        group.cpu.charge();
                    }
                }
            }
        }
        for slot in &mut inner.slots {
            if let Some(group) = slot.group.as_mut() {
                group.cpu.advance(now);
            }
        }
    }

    /// Switch-out hook. Accounting is tick-driven, so this only exists as
    /// an extension point for switch-time bookkeeping.
    pub fn on_switch_out(&self, _task: TaskId) {}

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a panic occurred mid-update; the
        // tables are still structurally sound for read/teardown paths.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn resolve(inner: &Inner, id: CGroupId) -> Result<&CGroup> {
    let slot = inner.slots.get(id.slot).ok_or(RtainerError::StaleHandle { kind: "cgroup" })?;
    if slot.generation != id.generation {
        return Err(RtainerError::StaleHandle { kind: "cgroup" });
    }
    slot.group
        .as_ref()
        .ok_or(RtainerError::StaleHandle { kind: "cgroup" })
}

fn resolve_mut(inner: &mut Inner, id: CGroupId) -> Result<&mut CGroup> {
    let slot = inner
        .slots
        .get_mut(id.slot)
        .ok_or(RtainerError::StaleHandle { kind: "cgroup" })?;
    if slot.generation != id.generation {
        return Err(RtainerError::StaleHandle { kind: "cgroup" });
    }
    slot.group
        .as_mut()
        .ok_or(RtainerError::StaleHandle { kind: "cgroup" })
}

fn binding(inner: &Inner, task: TaskId) -> Option<&CGroup> {
    let id = inner.bindings.iter().find(|(t, _)| *t == task).map(|(_, g)| *g)?;
    resolve(inner, id).ok()
}
