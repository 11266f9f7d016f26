//! The stack manager. Dual guard canaries, high-watermark tracking, and
//! the overflow hook.
//!
//! Grounded on `eqos::task::{TaskControlBlock::init, init_task_stack}`'s
//! fixed `[u8; STACK_SIZE]` array, generalized to a runtime-sized region
//! supplied by the caller (per DESIGN.md Open Question 2, `stack_init`
//! takes base+size, not a precomputed top). A single top-of-stack canary
//! only catches growth past the usable end; a second sentinel at the base
//! catches writes from below (a neighboring task's stack, a linker-placed
//! global scribbling upward into this one).

use dsrtos_core::error::{Error, Kind};
use dsrtos_core::port::{Port, StackRegion};

use crate::config::{KernelConfig, STACK_ALIGN};

/// Fill pattern written across an unused stack at task creation so the
/// watermark scan can find how deep it has ever been used.
const FILL_BYTE: u8 = 0xA5;

/// Sentinel word placed just past the usable end of the stack (the
/// direction growth must not reach). A mismatch means something wrote past
/// its bounds.
const CANARY: u32 = 0xDEAD_C0DE;

/// Sentinel word placed at the very base of the region, guarding against
/// writes from below.
const GUARD: u32 = 0xB16B_00B5;

/// Width in bytes reserved at each end of the stack for its guard
/// sentinel.
pub const GUARD_WIDTH: usize = 32;

/// Per-task stack bookkeeping. Does not own the memory; `base`/`size`
/// describe caller-provided storage (a `&'static mut [u8]` or an arena
/// slot), matching the port's `StackRegion`.
#[derive(Debug, Clone, Copy)]
pub struct StackInfo {
    base: *mut u8,
    size: usize,
    canary_offset: usize,
    overflow_count: u32,
    underflow_count: u32,
    check_count: u32,
}

// SAFETY: the raw pointer never aliases mutable kernel state outside of
// what the critical section already protects; StackInfo itself is just a
// descriptor, the same role `eqos`'s `*mut u32` stack_pointer field plays.
unsafe impl Send for StackInfo {}

/// Result of a `check()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackHealth {
    Intact,
    Overflowed,
    Underflowed,
}

impl StackInfo {
    /// Lays out both guard sentinels and the fill pattern across `region`
    /// and returns the bookkeeping handle plus the initial stack pointer
    /// from `Port::init_stack_frame`.
    ///
    /// # Safety
    /// `region` must describe writable memory that outlives the task.
    pub unsafe fn init<P: Port>(
        port: &P,
        region: StackRegion,
        entry: extern "C" fn(usize) -> !,
        arg: usize,
        cfg: &KernelConfig,
    ) -> Result<(Self, *mut u8), Error> {
        if region.base.is_null() || region.size < crate::config::MIN_STACK_SIZE {
            return Err(Error::new(Kind::NullStack));
        }
        if (region.base as usize) % STACK_ALIGN != 0 {
            return Err(Error::new(Kind::NullStack));
        }
        if region.size < GUARD_WIDTH * 2 {
            return Err(Error::new(Kind::NullStack));
        }
        let _ = cfg;

        core::ptr::write_bytes(region.base, FILL_BYTE, region.size);
        let canary_offset = region.size - 4;
        core::ptr::write_unaligned(region.base.add(canary_offset) as *mut u32, CANARY);
        core::ptr::write_unaligned(region.base as *mut u32, GUARD);

        let base = region.base;
        let size = region.size;
        let sp = port.init_stack_frame(region, entry, arg);

        Ok((
            StackInfo {
                base,
                size,
                canary_offset,
                overflow_count: 0,
                underflow_count: 0,
                check_count: 0,
            },
            sp,
        ))
    }

    /// Checks the top canary word; `false` means the stack has overflowed.
    pub fn canary_intact(&self) -> bool {
        // SAFETY: base/size were validated at init and the region outlives
        // the task by construction.
        let stored = unsafe {
            core::ptr::read_unaligned(self.base.add(self.canary_offset) as *const u32)
        };
        stored == CANARY
    }

    /// Checks the base guard word; `false` means something wrote below the
    /// region's start.
    pub fn guard_intact(&self) -> bool {
        // SAFETY: see canary_intact.
        let stored = unsafe { core::ptr::read_unaligned(self.base as *const u32) };
        stored == GUARD
    }

    /// Checks both sentinels, counting the call and any violation found.
    /// This is the path `Kernel::tick` calls for the currently running
    /// task every tick; `canary_intact`/`guard_intact` alone are not wired
    /// into anything on their own.
    pub fn check(&mut self) -> StackHealth {
        self.check_count = self.check_count.saturating_add(1);
        if !self.canary_intact() {
            self.overflow_count = self.overflow_count.saturating_add(1);
            StackHealth::Overflowed
        } else if !self.guard_intact() {
            self.underflow_count = self.underflow_count.saturating_add(1);
            StackHealth::Underflowed
        } else {
            StackHealth::Intact
        }
    }

    pub fn overflow_count(&self) -> u32 {
        self.overflow_count
    }

    pub fn underflow_count(&self) -> u32 {
        self.underflow_count
    }

    pub fn check_count(&self) -> u32 {
        self.check_count
    }

    /// Scans from the low end of the stack for the first byte that no
    /// longer matches the fill pattern, returning the high-watermark usage
    /// in bytes. O(stack size); intended for diagnostics, not the hot
    /// path.
    pub fn watermark_used(&self) -> usize {
        // SAFETY: see canary_intact.
        let slice = unsafe { core::slice::from_raw_parts(self.base, self.canary_offset) };
        let untouched = slice.iter().take_while(|&&b| b == FILL_BYTE).count();
        self.canary_offset.saturating_sub(untouched)
    }

    pub fn bytes_remaining(&self) -> usize {
        self.canary_offset.saturating_sub(self.watermark_used())
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
