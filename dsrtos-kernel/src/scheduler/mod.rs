//! The pluggable scheduler contract.
//!
//! The six concrete algorithms implement one `SchedulerPlugin` trait
//! rather than filling in a struct of C function pointers. The method set
//! mirrors the operations `r3_kernel::task::readyqueue::Queue` exposes
//! (`push_back_task`/`pop_front_task`/`reorder_task`/`has_ready_task_in_priority_range`),
//! generalized from one hard-wired bitmap-queue algorithm into an
//! open set of pluggable ones.

pub mod adaptive;
pub mod edf;
pub mod fair_share;
pub mod plugin;
pub mod rate_monotonic;
pub mod round_robin;
pub mod static_priority;

use dsrtos_core::error::Error;
use dsrtos_core::time::Instant;

use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

bitflags::bitflags! {
    /// Capabilities a plugin advertises in its descriptor, checked by the
    /// switch engine before migrating tasks onto it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const PREEMPTIVE       = 0b0000_0001;
        const DEADLINE_AWARE   = 0b0000_0010;
        const FAIR_SHARE       = 0b0000_0100;
        const PERIOD_AWARE     = 0b0000_1000;
        const WORKLOAD_ADAPTIVE = 0b0001_0000;
    }
}

/// Static metadata describing a plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub version: u16,
    pub capabilities: Capabilities,
}

impl PluginDescriptor {
    pub const fn new(name: &'static str, version: u16, capabilities: Capabilities) -> Self {
        Self {
            name,
            version,
            capabilities,
        }
    }

    /// CRC-16/CCITT-FALSE over `{name bytes, version, capability bits}`,
    /// re-verified before every activation (SPEC_FULL.md supplement:
    /// "Plugin descriptor checksum verification on registration").
    pub fn checksum(&self) -> u16 {
        let mut crc: u16 = 0xFFFF;
        let mut feed = |byte: u8| {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
        };
        for &b in self.name.as_bytes() {
            feed(b);
        }
        feed((self.version >> 8) as u8);
        feed((self.version & 0xFF) as u8);
        feed(self.capabilities.bits());
        crc
    }
}

/// What the kernel should do at the next tick after calling
/// `SchedulerPlugin::on_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Let the current task keep running.
    Continue,
    /// Re-run `select_next`; the current task's slice/deadline expired.
    Reschedule,
}

/// The pluggable scheduling-algorithm contract (C7).
///
/// All ready-queue state a plugin needs lives in the `Ready` structure
/// passed into every method; plugins themselves hold only algorithm
/// parameters (weights, time-slice length, period table), so migrating
/// between plugins (C10) only needs to move tasks between `Ready`
/// instances, not serialize arbitrary plugin-private state.
pub trait SchedulerPlugin: Send {
    fn descriptor(&self) -> PluginDescriptor;

    /// Computes the priority level this plugin files `task` at, given its
    /// base priority and scheduling parameters. Static-priority plugins
    /// return `base_priority` unchanged; EDF/RM/CFS derive a level from
    /// deadline, period, or virtual runtime respectively.
    fn priority_for(&self, base_priority: u16, params: SchedulingParams, now: Instant) -> u16;

    /// Enqueues `task` (arena slot `slot`) onto `ready` at the level
    /// `priority_for` computes, returning that level so the caller can
    /// keep the task's recorded priority in sync with where it actually
    /// landed (plugins that override this, like fair-share, file a task
    /// somewhere other than what `priority_for` alone would say).
    fn enqueue(
        &mut self,
        ready: &mut Ready,
        slot: u16,
        base_priority: u16,
        params: SchedulingParams,
        now: Instant,
    ) -> u16 {
        let level = self.priority_for(base_priority, params, now);
        ready.push_back(level, slot);
        level
    }

    /// Removes `slot` from `priority`'s level (task blocked, suspended, or
    /// destroyed).
    fn dequeue(&mut self, ready: &mut Ready, priority: u16, slot: u16) {
        ready.remove(priority, slot);
    }

    /// Picks the next task to run. `current` is the arena slot presently
    /// running, if any (so a plugin can prefer to keep it running when tied).
    fn select_next(&mut self, ready: &Ready, current: Option<u16>, now: Instant) -> Option<u16>;

    /// Called once per tick for the currently running task. Returns
    /// whether the kernel should re-invoke `select_next`.
    fn on_tick(&mut self, current: u16, params: SchedulingParams, now: Instant) -> TickAction;

    /// Hook invoked immediately before this plugin is deactivated by the
    /// switch engine (Phase 2, Suspend). Default no-op.
    fn on_suspend(&mut self) {}

    /// Hook invoked immediately after this plugin becomes active (Phase
    /// 4, Activate). Fallible: a plugin that needs warm-up state it could
    /// not allocate or validate reports that here and the switch engine
    /// treats the switch as degraded-but-running instead of silently
    /// pretending the new plugin is healthy. Default: always succeeds.
    fn on_activate(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Returns the task ids (as arena slots) this plugin is about to
    /// preempt `current` with, purely for trace/diagnostic purposes.
    /// Default: no extra diagnostics.
    fn peek_next(&self, _ready: &Ready) -> Option<u16> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_checksum_is_stable() {
        let d = PluginDescriptor::new("round-robin", 1, Capabilities::PREEMPTIVE);
        assert_eq!(d.checksum(), d.checksum());
    }

    #[test]
    fn descriptor_checksum_changes_with_version() {
        let a = PluginDescriptor::new("round-robin", 1, Capabilities::PREEMPTIVE);
        let b = PluginDescriptor::new("round-robin", 2, Capabilities::PREEMPTIVE);
        assert_ne!(a.checksum(), b.checksum());
    }
}
