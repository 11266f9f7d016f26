//! Completely-fair-share style scheduling: tasks are ranked by virtual
//! runtime, weighted by their `SchedulingParams::weight`, and the lowest
//! vruntime always runs next.

use dsrtos_core::time::Instant;

use crate::config::{MAX_PRIORITY_LEVELS, MAX_TASKS};
use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::{Capabilities, PluginDescriptor, SchedulerPlugin, TickAction};

pub struct FairShare {
    vruntime: [u32; MAX_TASKS],
}

impl FairShare {
    pub const fn new() -> Self {
        Self {
            vruntime: [0; MAX_TASKS],
        }
    }

    fn weight(params: SchedulingParams) -> u32 {
        params.weight.max(1) as u32
    }

    /// Vruntime increases each tick in inverse proportion to weight; a
    /// heavier task accrues vruntime more slowly and so gets to run more.
    fn accrue(&mut self, slot: u16, params: SchedulingParams) {
        let w = Self::weight(params);
        self.vruntime[slot as usize] = self.vruntime[slot as usize].saturating_add(1024 / w);
    }

    fn level_for(&self, slot: u16) -> u16 {
        let max_level = MAX_PRIORITY_LEVELS - 1;
        (self.vruntime[slot as usize] % (max_level as u32 + 1)) as u16
    }
}

impl Default for FairShare {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPlugin for FairShare {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("fair-share", 1, Capabilities::PREEMPTIVE | Capabilities::FAIR_SHARE)
    }

    fn priority_for(&self, _base_priority: u16, _params: SchedulingParams, _now: Instant) -> u16 {
        // Overridden via enqueue below; a freshly-created task with zero
        // accrued vruntime starts at level 0, the most urgent, so it does
        // not starve behind long-running tasks.
        0
    }

    fn enqueue(
        &mut self,
        ready: &mut Ready,
        slot: u16,
        _base_priority: u16,
        _params: SchedulingParams,
        _now: Instant,
    ) -> u16 {
        let level = self.level_for(slot);
        ready.push_back(level, slot);
        level
    }

    fn select_next(&mut self, ready: &Ready, _current: Option<u16>, _now: Instant) -> Option<u16> {
        let level = ready.highest_ready()?;
        ready.iter_level(level).next()
    }

    fn on_tick(&mut self, current: u16, params: SchedulingParams, _now: Instant) -> TickAction {
        self.accrue(current, params);
        TickAction::Reschedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heavier_task_accrues_vruntime_more_slowly() {
        let mut fs = FairShare::new();
        let heavy = SchedulingParams {
            weight: 4,
            ..Default::default()
        };
        let light = SchedulingParams {
            weight: 1,
            ..Default::default()
        };
        fs.on_tick(0, heavy, Instant::from_ticks(0));
        fs.on_tick(1, light, Instant::from_ticks(0));
        assert!(fs.vruntime[0] < fs.vruntime[1]);
    }
}
