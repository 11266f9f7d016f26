//! Rate-monotonic: priority assigned by period, shorter period = higher
//! priority. Periods are quantized into the same fixed level space EDF
//! uses, for the same reason (see `edf.rs`).

use dsrtos_core::time::Instant;

use crate::config::MAX_PRIORITY_LEVELS;
use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::{Capabilities, PluginDescriptor, SchedulerPlugin, TickAction};

pub struct RateMonotonic;

impl RateMonotonic {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for RateMonotonic {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPlugin for RateMonotonic {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            "rate-monotonic",
            1,
            Capabilities::PREEMPTIVE | Capabilities::PERIOD_AWARE,
        )
    }

    fn priority_for(&self, base_priority: u16, params: SchedulingParams, _now: Instant) -> u16 {
        let max_level = (MAX_PRIORITY_LEVELS - 1) as u64;
        match params.period {
            Some(period) => period.as_ticks().min(max_level) as u16,
            // No period: fall back to the explicit base priority rather
            // than guessing a rate.
            None => base_priority,
        }
    }

    fn select_next(&mut self, ready: &Ready, _current: Option<u16>, _now: Instant) -> Option<u16> {
        let level = ready.highest_ready()?;
        ready.iter_level(level).next()
    }

    fn on_tick(&mut self, _current: u16, _params: SchedulingParams, _now: Instant) -> TickAction {
        TickAction::Continue
    }
}
