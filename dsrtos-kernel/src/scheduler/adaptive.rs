//! Adaptive scheduling: blends static-priority and fair-share ranking,
//! the blend weight driven by the decision engine (C11) rather than fixed
//! at construction time.
//!
//! The periodic-re-evaluation cadence is loosely modeled on
//! `eqos::scheduler::Scheduler::tick`'s call to `evaluate_game()` every
//! `EVAL_FREQUENCY` ticks; the payoff/strategy math in `eqos::game` is
//! specific to its game-theoretic design and is not reused — here the
//! blend weight comes from `manager.rs`'s workload classification, not a
//! payoff function.

use dsrtos_core::time::Instant;

use crate::config::{MAX_PRIORITY_LEVELS, MAX_TASKS};
use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::{Capabilities, PluginDescriptor, SchedulerPlugin, TickAction};

pub struct Adaptive {
    vruntime: [u32; MAX_TASKS],
    /// 0 = pure static-priority, 100 = pure fair-share. Set by the
    /// decision engine in response to workload classification.
    fairness_bias: u8,
}

impl Adaptive {
    pub const fn new() -> Self {
        Self {
            vruntime: [0; MAX_TASKS],
            fairness_bias: 0,
        }
    }

    pub fn set_fairness_bias(&mut self, bias: u8) {
        self.fairness_bias = bias.min(100);
    }

    pub fn fairness_bias(&self) -> u8 {
        self.fairness_bias
    }

    fn blended_level(&self, slot: u16, base_priority: u16) -> u16 {
        let max_level = (MAX_PRIORITY_LEVELS - 1) as u32;
        let fair_level = self.vruntime[slot as usize] % (max_level + 1);
        let static_level = (base_priority as u32).min(max_level);
        let bias = self.fairness_bias as u32;
        (((100 - bias) * static_level + bias * fair_level) / 100) as u16
    }
}

impl Default for Adaptive {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPlugin for Adaptive {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            "adaptive",
            1,
            Capabilities::PREEMPTIVE | Capabilities::FAIR_SHARE | Capabilities::WORKLOAD_ADAPTIVE,
        )
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
        let level = self.blended_level(slot, base_priority);
        ready.push_back(level, slot);
        level
    }

    fn select_next(&mut self, ready: &Ready, _current: Option<u16>, _now: Instant) -> Option<u16> {
        let level = ready.highest_ready()?;
        ready.iter_level(level).next()
    }

    fn on_tick(&mut self, current: u16, params: SchedulingParams, _now: Instant) -> TickAction {
        let w = params.weight.max(1) as u32;
        self.vruntime[current as usize] = self.vruntime[current as usize].saturating_add(1024 / w);
        TickAction::Reschedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bias_behaves_like_static_priority() {
        let mut a = Adaptive::new();
        a.set_fairness_bias(0);
        assert_eq!(a.blended_level(0, 7), 7);
    }

    #[test]
    fn full_bias_ignores_base_priority() {
        let mut a = Adaptive::new();
        a.vruntime[0] = 42;
        a.set_fairness_bias(100);
        assert_eq!(a.blended_level(0, 7), 42);
    }

    #[test]
    fn bias_is_clamped_to_100() {
        let mut a = Adaptive::new();
        a.set_fairness_bias(255);
        assert_eq!(a.fairness_bias(), 100);
    }
}
