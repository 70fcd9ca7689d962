//! Memory accounting: usage, peak, and admission against a byte limit.

use rtainer_common::constants::MEMORY_NO_LIMIT;

/// Per-cgroup memory accounting.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    /// Byte limit; [`MEMORY_NO_LIMIT`] disables gating.
    pub limit: u64,
    /// Bytes currently accounted.
    pub used: u64,
    /// High-water mark since the last explicit reset.
    pub peak: u64,
}

impl MemoryStats {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            limit,
            used: 0,
            peak: 0,
        }
    }

    /// Returns whether an allocation of `size` bytes fits under the limit.
    #[must_use]
    pub fn admits(&self, size: u64) -> bool {
        self.limit == MEMORY_NO_LIMIT || self.used.saturating_add(size) <= self.limit
    }

    /// Applies a signed usage delta. Deallocation clamps at zero and never
    /// wraps.
    pub(crate) fn apply(&mut self, delta: i64) {
        if delta >= 0 {
            self.used = self.used.saturating_add(delta.unsigned_abs());
            if self.used > self.peak {
                self.peak = self.used;
            }
        } else {
            self.used = self.used.saturating_sub(delta.unsigned_abs());
        }
    }

    /// Resets usage and peak; the limit is kept.
    pub(crate) fn reset(&mut self) {
        self.used = 0;
        self.peak = 0;
    }
}
