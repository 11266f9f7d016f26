//! Compile-time and run-time kernel configuration.
//!
//! Grounded on `eqos::config`'s flat `const` knobs, with the const-time
//! validation `r3_core::kernel::cfg`'s `CfgBuilder` performs before a
//! kernel image is finalized.

use dsrtos_core::error::{Error, Kind};

/// Lowest legal number of priority levels.
pub const MIN_PRIORITY_LEVELS: u16 = 1;
/// Highest legal number of priority levels; one word per 32 priorities in
/// the two-level bitmap, eight summary words.
pub const MAX_PRIORITY_LEVELS: u16 = 256;

/// Smallest stack the stack manager will accept for a task, in bytes.
pub const MIN_STACK_SIZE: usize = 256;

/// Required alignment for every task stack.
pub const STACK_ALIGN: usize = 8;

/// Maximum number of scheduler plugins the registry can hold at once.
pub const MAX_PLUGINS: usize = 8;

/// Fixed arena capacity for tasks and ready-queue slots. A single
/// compile-time constant rather than a const-generic parameter threaded
/// through every type, matching the "single kernel context instead of
/// pervasive globals/parameters" Design Note.
pub const MAX_TASKS: usize = 64;

/// Fixed arena capacity for priority-inheritance resources.
pub const MAX_RESOURCES: usize = 16;

/// Fixed arena capacity for priority-inheritance chain nodes.
pub const MAX_CHAIN_NODES: usize = 32;

/// Maximum depth of a priority-inheritance chain before it is truncated
/// (bounded at 8).
pub const MAX_INHERITANCE_DEPTH: usize = 8;

/// Runtime-assembled kernel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub max_tasks: u16,
    pub priority_levels: u16,
    pub tick_rate_hz: u32,
    pub default_stack_size: usize,
    pub max_chain_nodes: u16,
    pub max_resources: u16,
    pub stack_safety_margin: usize,
    pub preemptive: bool,
    /// Run every task to voluntary yield points only; no timer-driven
    /// preemption. Mutually exclusive with `preemptive`.
    pub cooperative: bool,
    /// Whether this configuration intends to boot with the round-robin
    /// plugin, checked against `preemptive` here since round-robin without
    /// preemption can never time-slice.
    pub uses_round_robin: bool,
    pub adaptation_hysteresis_ticks: u32,
    pub adaptation_stability_threshold: u8,
}

impl KernelConfig {
    /// A reasonable default for a small embedded target: 32 tasks, 32
    /// priority levels, 1kHz tick, 1KiB default stacks.
    pub const fn default_small() -> Self {
        Self {
            max_tasks: 32,
            priority_levels: 32,
            tick_rate_hz: 1000,
            default_stack_size: 1024,
            max_chain_nodes: 16,
            max_resources: 16,
            stack_safety_margin: 64,
            preemptive: true,
            cooperative: false,
            uses_round_robin: false,
            adaptation_hysteresis_ticks: 100,
            adaptation_stability_threshold: 3,
        }
    }

    /// Validates the field combinations below. `const fn` so it can be
    /// invoked from a `const _: () = ...` assertion at the crate root for
    /// hard-wired configurations, in addition to being called at runtime
    /// when a configuration is assembled dynamically.
    pub const fn validate(&self) -> Result<(), Error> {
        if self.priority_levels < MIN_PRIORITY_LEVELS || self.priority_levels > MAX_PRIORITY_LEVELS
        {
            return Err(Error::new(Kind::BadConfig));
        }
        if self.tick_rate_hz == 0 {
            return Err(Error::new(Kind::BadConfig));
        }
        if self.default_stack_size < MIN_STACK_SIZE {
            return Err(Error::new(Kind::BadConfig));
        }
        if self.default_stack_size % STACK_ALIGN != 0 {
            return Err(Error::new(Kind::BadConfig));
        }
        if self.max_tasks == 0 {
            return Err(Error::new(Kind::BadConfig));
        }
        if self.cooperative && self.preemptive {
            return Err(Error::new(Kind::BadConfig));
        }
        if self.uses_round_robin && !self.preemptive {
            return Err(Error::new(Kind::BadConfig));
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::default_small()
    }
}

// Hard-wired default must itself be valid; fails the build otherwise.
const _: () = assert!(KernelConfig::default_small().validate().is_ok());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(KernelConfig::default_small().validate().is_ok());
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let mut cfg = KernelConfig::default_small();
        cfg.tick_rate_hz = 0;
        assert_eq!(cfg.validate().unwrap_err().kind(), Kind::BadConfig);
    }

    #[test]
    fn too_many_priority_levels_is_rejected() {
        let mut cfg = KernelConfig::default_small();
        cfg.priority_levels = MAX_PRIORITY_LEVELS + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn misaligned_stack_size_is_rejected() {
        let mut cfg = KernelConfig::default_small();
        cfg.default_stack_size = MIN_STACK_SIZE + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cooperative_and_preemptive_is_rejected() {
        let mut cfg = KernelConfig::default_small();
        cfg.cooperative = true;
        cfg.preemptive = true;
        assert_eq!(cfg.validate().unwrap_err().kind(), Kind::BadConfig);
    }

    #[test]
    fn round_robin_without_preemption_is_rejected() {
        let mut cfg = KernelConfig::default_small();
        cfg.preemptive = false;
        cfg.uses_round_robin = true;
        assert_eq!(cfg.validate().unwrap_err().kind(), Kind::BadConfig);
    }
}
