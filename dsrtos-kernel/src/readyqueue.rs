//! The ready queue. FIFO-within-priority-level dispatch backed by the
//! bitmap in `bitmap.rs`.
//!
//! `r3_kernel::task::readyqueue::BitmapQueue` threads an intrusive,
//! back-pointer doubly-linked list through each `TaskCb` behind a
//! `CpuLockCell`. This is rebuilt as plain arrays of `Option<u16>` links
//! indexed by task-arena slot, with no pointers and no per-task lock
//! cell — the whole queue lives behind the kernel's single critical
//! section instead.

use crate::bitmap::PriorityBitmap;
use crate::config::MAX_PRIORITY_LEVELS;

const LEVELS: usize = MAX_PRIORITY_LEVELS as usize;

/// A bounded FIFO-per-level ready queue over `MAX_TASKS` arena slots.
#[derive(Clone, Copy)]
pub struct ReadyQueue<const MAX_TASKS: usize> {
    bitmap: PriorityBitmap,
    heads: [Option<u16>; LEVELS],
    tails: [Option<u16>; LEVELS],
    next: [Option<u16>; MAX_TASKS],
}

impl<const MAX_TASKS: usize> ReadyQueue<MAX_TASKS> {
    pub const fn new() -> Self {
        Self {
            bitmap: PriorityBitmap::new(),
            heads: [None; LEVELS],
            tails: [None; LEVELS],
            next: [None; MAX_TASKS],
        }
    }

    /// Appends `slot` to the tail of `priority`'s level.
    pub fn push_back(&mut self, priority: u16, slot: u16) {
        self.next[slot as usize] = None;
        match self.tails[priority as usize] {
            Some(tail) => {
                self.next[tail as usize] = Some(slot);
            }
            None => {
                self.heads[priority as usize] = Some(slot);
            }
        }
        self.tails[priority as usize] = Some(slot);
        self.bitmap.set(priority);
    }

    /// Removes and returns the head of `priority`'s level.
    pub fn pop_front(&mut self, priority: u16) -> Option<u16> {
        let head = self.heads[priority as usize]?;
        let next = self.next[head as usize].take();
        self.heads[priority as usize] = next;
        if next.is_none() {
            self.tails[priority as usize] = None;
            self.bitmap.clear(priority);
        }
        Some(head)
    }

    /// Removes `slot` from anywhere within `priority`'s level (used when a
    /// task's priority changes and it must be reinserted at its new
    /// level). O(level length).
    pub fn remove(&mut self, priority: u16, slot: u16) -> bool {
        let mut cur = self.heads[priority as usize];
        let mut prev: Option<u16> = None;
        while let Some(node) = cur {
            let next = self.next[node as usize];
            if node == slot {
                match prev {
                    Some(p) => self.next[p as usize] = next,
                    None => self.heads[priority as usize] = next,
                }
                if self.tails[priority as usize] == Some(slot) {
                    self.tails[priority as usize] = prev;
                }
                if self.heads[priority as usize].is_none() {
                    self.bitmap.clear(priority);
                }
                return true;
            }
            prev = Some(node);
            cur = next;
        }
        false
    }

    /// Returns the highest-priority non-empty level without removing
    /// anything, the core of C7's `select_next` contract.
    pub fn highest_ready(&self) -> Option<u16> {
        self.bitmap.find_set()
    }

    pub fn highest_ready_below(&self, ceiling: u16) -> Option<u16> {
        self.bitmap.find_set_below(ceiling)
    }

    pub fn is_level_empty(&self, priority: u16) -> bool {
        self.heads[priority as usize].is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Iterates the FIFO chain at `priority` without removing anything.
    pub fn iter_level(&self, priority: u16) -> impl Iterator<Item = u16> + '_ {
        let mut cur = self.heads[priority as usize];
        core::iter::from_fn(move || {
            let node = cur?;
            cur = self.next[node as usize];
            Some(node)
        })
    }

    /// Number of levels where the bitmap's bit disagrees with whether
    /// that level's list is actually empty. Used by the integrity checker
    /// (C12); should always be zero in a correctly-running kernel.
    pub fn bitmap_mismatches(&self) -> u16 {
        let mut mismatches = 0;
        for level in 0..LEVELS as u16 {
            if self.bitmap.is_set(level) == self.is_level_empty(level) {
                mismatches += 1;
            }
        }
        mismatches
    }

    /// Total number of tasks enqueued across every level. O(capacity);
    /// for diagnostics, not the hot path.
    pub fn total_enqueued(&self) -> usize {
        (0..LEVELS as u16).map(|l| self.iter_level(l).count()).sum()
    }

    /// Resynchronizes the bitmap purely from the head-pointer array,
    /// which is taken as ground truth. The cheapest integrity repair.
    pub fn resync_bitmap(&mut self) {
        let mut fresh = PriorityBitmap::new();
        for level in 0..LEVELS as u16 {
            if self.heads[level as usize].is_some() {
                fresh.set(level);
            }
        }
        self.bitmap = fresh;
    }
}

impl<const MAX_TASKS: usize> Default for ReadyQueue<MAX_TASKS> {
    fn default() -> Self {
        Self::new()
    }
}

/// The production ready queue, sized by `config::MAX_TASKS`.
pub type Ready = ReadyQueue<{ crate::config::MAX_TASKS }>;
