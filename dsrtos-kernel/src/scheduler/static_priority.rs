//! Static-priority preemptive scheduling: the base case every other
//! plugin's priority levels are ultimately expressed in terms of.

use dsrtos_core::time::Instant;

use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::{Capabilities, PluginDescriptor, SchedulerPlugin, TickAction};

pub struct StaticPriority;

impl StaticPriority {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for StaticPriority {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPlugin for StaticPriority {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("static-priority", 1, Capabilities::PREEMPTIVE)
    }

    fn priority_for(&self, base_priority: u16, _params: SchedulingParams, _now: Instant) -> u16 {
        base_priority
    }

    fn select_next(&mut self, ready: &Ready, _current: Option<u16>, _now: Instant) -> Option<u16> {
        let level = ready.highest_ready()?;
        ready.iter_level(level).next()
    }

    fn on_tick(&mut self, _current: u16, _params: SchedulingParams, _now: Instant) -> TickAction {
        // A strictly static-priority scheduler never preempts on the
        // clock alone; only a higher-priority arrival triggers a
        // reschedule, handled by the kernel calling select_next after
        // every enqueue.
        TickAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_wins() {
        let mut sp = StaticPriority::new();
        let mut ready: Ready = Ready::new();
        ready.push_back(10, 0);
        ready.push_back(2, 1);
        assert_eq!(sp.select_next(&ready, None, Instant::from_ticks(0)), Some(1));
    }
}
