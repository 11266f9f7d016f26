//! The closed set of built-in scheduling algorithms, dispatched through a
//! tagged enum rather than a trait object.
//!
//! This kernel has no dynamic allocator to box a `dyn SchedulerPlugin`
//! into, and the six built-in algorithms are a closed, known-at-
//! compile-time set, so `Plugin` wraps each concrete type in an enum and
//! forwards every `SchedulerPlugin` method by match. `dyn SchedulerPlugin`
//! remains available (see `scheduler::mod`) for a host
//! build that does have an allocator and wants to register a custom
//! plugin; the kernel proper only ever stores `Plugin`.

use dsrtos_core::error::Error;
use dsrtos_core::time::Instant;

use crate::readyqueue::Ready;
use crate::task::SchedulingParams;

use super::adaptive::Adaptive;
use super::edf::Edf;
use super::fair_share::FairShare;
use super::rate_monotonic::RateMonotonic;
use super::round_robin::RoundRobin;
use super::static_priority::StaticPriority;
use super::{PluginDescriptor, SchedulerPlugin, TickAction};

pub enum Plugin {
    RoundRobin(RoundRobin),
    StaticPriority(StaticPriority),
    Edf(Edf),
    RateMonotonic(RateMonotonic),
    FairShare(FairShare),
    Adaptive(Adaptive),
}

macro_rules! dispatch {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            Plugin::RoundRobin(p) => p.$method($($arg),*),
            Plugin::StaticPriority(p) => p.$method($($arg),*),
            Plugin::Edf(p) => p.$method($($arg),*),
            Plugin::RateMonotonic(p) => p.$method($($arg),*),
            Plugin::FairShare(p) => p.$method($($arg),*),
            Plugin::Adaptive(p) => p.$method($($arg),*),
        }
    };
}

impl SchedulerPlugin for Plugin {
    fn descriptor(&self) -> PluginDescriptor {
        dispatch!(self, descriptor())
    }

    fn priority_for(&self, base_priority: u16, params: SchedulingParams, now: Instant) -> u16 {
        dispatch!(self, priority_for(base_priority, params, now))
    }

    fn enqueue(
        &mut self,
        ready: &mut Ready,
        slot: u16,
        base_priority: u16,
        params: SchedulingParams,
        now: Instant,
    ) -> u16 {
        dispatch!(self, enqueue(ready, slot, base_priority, params, now))
    }

    fn dequeue(&mut self, ready: &mut Ready, priority: u16, slot: u16) {
        dispatch!(self, dequeue(ready, priority, slot))
    }

    fn select_next(&mut self, ready: &Ready, current: Option<u16>, now: Instant) -> Option<u16> {
        dispatch!(self, select_next(ready, current, now))
    }

    fn on_tick(&mut self, current: u16, params: SchedulingParams, now: Instant) -> TickAction {
        dispatch!(self, on_tick(current, params, now))
    }

    fn on_suspend(&mut self) {
        dispatch!(self, on_suspend())
    }

    fn on_activate(&mut self) -> Result<(), Error> {
        dispatch!(self, on_activate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_dispatches_to_variant() {
        let p = Plugin::RoundRobin(RoundRobin::new(10));
        assert_eq!(p.descriptor().name, "round-robin");
        let p = Plugin::Edf(Edf::new());
        assert_eq!(p.descriptor().name, "edf");
    }
}
