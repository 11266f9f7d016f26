//! Earliest-deadline-first.
//!
//! The ready queue gives us a fixed 256-level priority space, not an
//! arbitrary-precision deadline ordering, so a task's absolute deadline is
//! quantized into a level: the number of ticks remaining until the
//! deadline, clamped to `0..MAX_PRIORITY_LEVELS`. Deadlines further out
//! than the level count collapse to the lowest urgency level; this loses
//! ordering precision among far-future deadlines but preserves it exactly
//! among the ones close enough to matter for the next dispatch decision.

use dsrtos_core::time::Instant;

use crate::config::{MAX_PRIORITY_LEVELS, MAX_TASKS};
use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::{Capabilities, PluginDescriptor, SchedulerPlugin, TickAction};

pub struct Edf {
    deadline_misses: u32,
    /// Whether a miss was already counted for this slot's current
    /// deadline, so a task that keeps running past it is not recounted
    /// every tick. Cleared on re-enqueue (a fresh deadline).
    missed: [bool; MAX_TASKS],
}

impl Edf {
    pub const fn new() -> Self {
        Self {
            deadline_misses: 0,
            missed: [false; MAX_TASKS],
        }
    }

    pub fn deadline_misses(&self) -> u32 {
        self.deadline_misses
    }

    /// Called when a task's deadline timer fires before it has finished
    /// running. Idempotent per deadline: `enqueue` clears the flag for a
    /// new one.
    pub fn on_timer_expired(&mut self, slot: u16) {
        let slot = slot as usize;
        if !self.missed[slot] {
            self.missed[slot] = true;
            self.deadline_misses = self.deadline_misses.saturating_add(1);
        }
    }
}

impl Default for Edf {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPlugin for Edf {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("edf", 1, Capabilities::PREEMPTIVE | Capabilities::DEADLINE_AWARE)
    }

    fn priority_for(&self, _base_priority: u16, params: SchedulingParams, now: Instant) -> u16 {
        let max_level = (MAX_PRIORITY_LEVELS - 1) as u64;
        match params.deadline {
            Some(deadline) => match deadline.checked_duration_since(now) {
                Some(remaining) => remaining.as_ticks().min(max_level) as u16,
                // Deadline already passed: most urgent level.
                None => 0,
            },
            // No deadline set: least urgent level, below everything else.
            None => max_level as u16,
        }
    }

    fn enqueue(
        &mut self,
        ready: &mut Ready,
        slot: u16,
        base_priority: u16,
        params: SchedulingParams,
        now: Instant,
    ) -> u16 {
        self.missed[slot as usize] = false;
        let level = self.priority_for(base_priority, params, now);
        ready.push_back(level, slot);
        level
    }

    fn select_next(&mut self, ready: &Ready, _current: Option<u16>, _now: Instant) -> Option<u16> {
        let level = ready.highest_ready()?;
        ready.iter_level(level).next()
    }

    fn on_tick(&mut self, current: u16, params: SchedulingParams, now: Instant) -> TickAction {
        match params.deadline {
            // Re-rank every tick so urgency increases as the deadline
            // approaches, rather than only on enqueue.
            Some(deadline) if deadline > now => TickAction::Reschedule,
            Some(_) => {
                self.on_timer_expired(current);
                TickAction::Continue
            }
            None => TickAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsrtos_core::time::Duration;

    #[test]
    fn closer_deadline_gets_lower_level() {
        let edf = Edf::new();
        let now = Instant::from_ticks(100);
        let near = SchedulingParams {
            deadline: Some(now + Duration::from_ticks(5)),
            ..Default::default()
        };
        let far = SchedulingParams {
            deadline: Some(now + Duration::from_ticks(50)),
            ..Default::default()
        };
        assert!(edf.priority_for(0, near, now) < edf.priority_for(0, far, now));
    }

    #[test]
    fn missed_deadline_is_most_urgent() {
        let edf = Edf::new();
        let now = Instant::from_ticks(100);
        let missed = SchedulingParams {
            deadline: Some(Instant::from_ticks(50)),
            ..Default::default()
        };
        assert_eq!(edf.priority_for(0, missed, now), 0);
    }

    #[test]
    fn overdue_task_increments_deadline_misses_once() {
        let mut edf = Edf::new();
        let params = SchedulingParams {
            deadline: Some(Instant::from_ticks(50)),
            ..Default::default()
        };
        let now = Instant::from_ticks(100);
        edf.on_tick(0, params, now);
        edf.on_tick(0, params, now);
        assert_eq!(edf.deadline_misses(), 1);
    }

    #[test]
    fn re_enqueue_clears_miss_flag_for_a_fresh_deadline() {
        let mut edf = Edf::new();
        let mut ready: Ready = Ready::new();
        let overdue = SchedulingParams {
            deadline: Some(Instant::from_ticks(50)),
            ..Default::default()
        };
        edf.on_tick(0, overdue, Instant::from_ticks(100));
        assert_eq!(edf.deadline_misses(), 1);
        edf.enqueue(&mut ready, 0, 0, overdue, Instant::from_ticks(100));
        edf.on_tick(0, overdue, Instant::from_ticks(100));
        assert_eq!(edf.deadline_misses(), 2);
    }
}
