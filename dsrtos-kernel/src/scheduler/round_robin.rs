//! Round-robin: every task at its base priority level, time-sliced
//! within a level.
//!
//! Grounded on `eqos::scheduler::Scheduler::schedule`'s linear scan with a
//! fixed time-slice decrement per tick, restated against the shared
//! bitmap/ready-queue instead of a linear array scan. Rotation (head to
//! tail once a slice expires) reuses the same remove-then-reinsert-at-
//! level primitive `readyqueue.rs` documents for priority changes; here
//! the level never changes, only position within it.

use dsrtos_core::time::Instant;

use crate::config::MAX_TASKS;
use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::{Capabilities, PluginDescriptor, SchedulerPlugin, TickAction};

pub struct RoundRobin {
    slice_ticks: u32,
    /// Ticks left in the current task's slice, indexed by arena slot.
    /// Reset to `slice_ticks` on enqueue and on expiry.
    remaining: [u32; MAX_TASKS],
}

impl RoundRobin {
    pub const fn new(slice_ticks: u32) -> Self {
        Self {
            slice_ticks,
            remaining: [0; MAX_TASKS],
        }
    }
}

impl SchedulerPlugin for RoundRobin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("round-robin", 1, Capabilities::PREEMPTIVE)
    }

    fn priority_for(&self, base_priority: u16, _params: SchedulingParams, _now: Instant) -> u16 {
        base_priority
    }

    fn enqueue(
        &mut self,
        ready: &mut Ready,
        slot: u16,
        base_priority: u16,
        _params: SchedulingParams,
        _now: Instant,
    ) -> u16 {
        self.remaining[slot as usize] = self.slice_ticks.max(1);
        ready.push_back(base_priority, slot);
        base_priority
    }

    fn select_next(&mut self, ready: &Ready, _current: Option<u16>, _now: Instant) -> Option<u16> {
        let level = ready.highest_ready()?;
        ready.iter_level(level).next()
    }

    fn on_tick(&mut self, current: u16, _params: SchedulingParams, _now: Instant) -> TickAction {
        let slot = current as usize;
        if self.remaining[slot] == 0 {
            self.remaining[slot] = self.slice_ticks.max(1);
        }
        self.remaining[slot] -= 1;
        if self.remaining[slot] == 0 {
            self.remaining[slot] = self.slice_ticks.max(1);
            TickAction::Reschedule
        } else {
            TickAction::Continue
        }
    }
}

impl RoundRobin {
    pub fn slice_ticks(&self) -> u32 {
        self.slice_ticks
    }

    pub fn ticks_remaining(&self, slot: u16) -> u32 {
        self.remaining[slot as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_head_of_highest_level() {
        let mut rr = RoundRobin::new(10);
        let mut ready: Ready = Ready::new();
        ready.push_back(3, 0);
        ready.push_back(3, 1);
        let picked = rr.select_next(&ready, None, Instant::from_ticks(0));
        assert_eq!(picked, Some(0));
    }

    #[test]
    fn slice_does_not_expire_before_its_length() {
        let mut rr = RoundRobin::new(3);
        rr.remaining[0] = 3;
        assert_eq!(rr.on_tick(0, SchedulingParams::default(), Instant::from_ticks(0)), TickAction::Continue);
        assert_eq!(rr.on_tick(0, SchedulingParams::default(), Instant::from_ticks(0)), TickAction::Continue);
        assert_eq!(rr.on_tick(0, SchedulingParams::default(), Instant::from_ticks(0)), TickAction::Reschedule);
    }

    #[test]
    fn expiry_resets_the_slice() {
        let mut rr = RoundRobin::new(2);
        rr.remaining[0] = 2;
        rr.on_tick(0, SchedulingParams::default(), Instant::from_ticks(0));
        rr.on_tick(0, SchedulingParams::default(), Instant::from_ticks(0));
        assert_eq!(rr.ticks_remaining(0), 2);
    }

    #[test]
    fn rotation_moves_head_to_tail_on_expiry() {
        let mut rr = RoundRobin::new(1);
        let mut ready: Ready = Ready::new();
        rr.enqueue(&mut ready, 0, 5, SchedulingParams::default(), Instant::from_ticks(0));
        rr.enqueue(&mut ready, 1, 5, SchedulingParams::default(), Instant::from_ticks(0));

        assert_eq!(ready.iter_level(5).next(), Some(0));
        let action = rr.on_tick(0, SchedulingParams::default(), Instant::from_ticks(0));
        assert_eq!(action, TickAction::Reschedule);
        ready.remove(5, 0);
        rr.enqueue(&mut ready, 0, 5, SchedulingParams::default(), Instant::from_ticks(1));
        assert_eq!(ready.iter_level(5).collect::<Vec<_>>(), vec![1, 0]);
    }
}
