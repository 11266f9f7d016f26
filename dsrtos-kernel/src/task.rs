//! Task control blocks and the task arena.
//!
//! Grounded on `r3_kernel::task::{TaskCb, TaskSt}` for the state machine
//! and on `eqos::task::TaskControlBlock` for the concrete, no-generics
//! struct shape (fixed array of slots rather than `r3_kernel`'s
//! const-generic `Traits`-parameterized cell). Handles are typed
//! `TaskId`s with a generation counter, not raw indices or pointers.

use dsrtos_core::error::{Error, Kind};
use dsrtos_core::ids::TaskId;
use dsrtos_core::time::{Duration, Instant};

use crate::stack::StackInfo;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Dormant,
    Ready,
    Running,
    Blocked,
    Suspended,
    Terminated,
}

/// Scheduling-class-specific parameters a task may carry. Plugins that do
/// not use a field simply ignore it (e.g. round-robin ignores `deadline`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulingParams {
    pub deadline: Option<Instant>,
    pub period: Option<Duration>,
    pub wcet: Option<Duration>,
    pub weight: u16,
}

/// A task control block.
#[derive(Debug, Clone, Copy)]
pub struct TaskControlBlock {
    state: TaskState,
    base_priority: u16,
    effective_priority: u16,
    stack: Option<StackInfo>,
    stack_pointer: *mut u8,
    params: SchedulingParams,
    time_slice_remaining: u32,
    arrival: Instant,
    /// Index into the priority-inheritance chain pool this task currently
    /// heads, if it is blocked waiting on a resource. `None` otherwise.
    wait_chain: Option<u16>,
    /// State to return to on `resume()`; set by `suspend()`, consumed and
    /// cleared by `resume()`. `None` when not currently suspended.
    pre_suspend_state: Option<TaskState>,
    restart_count: u32,
    /// Tick at which a task blocked by `delay` should be woken. `None`
    /// when the task is not sleeping on a timed delay.
    delay_until: Option<u64>,
    active: bool,
    generation: u16,
}

// SAFETY: stack_pointer is only read/written by the kernel under its
// single critical section; the TCB itself crosses no thread boundary that
// the port hasn't already fenced.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    const fn empty(generation: u16) -> Self {
        Self {
            state: TaskState::Dormant,
            base_priority: 0,
            effective_priority: 0,
            stack: None,
            stack_pointer: core::ptr::null_mut(),
            params: SchedulingParams {
                deadline: None,
                period: None,
                wcet: None,
                weight: 1,
            },
            time_slice_remaining: 0,
            arrival: Instant::from_ticks(0),
            wait_chain: None,
            pre_suspend_state: None,
            restart_count: 0,
            delay_until: None,
            active: false,
            generation,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn base_priority(&self) -> u16 {
        self.base_priority
    }

    pub fn effective_priority(&self) -> u16 {
        self.effective_priority
    }

    pub fn set_effective_priority(&mut self, priority: u16) {
        self.effective_priority = priority;
    }

    /// Sets the state field directly, bypassing the dormant/ready/etc.
    /// transition checks `TaskArena::activate`/`set_state` apply. For use
    /// by kernel-internal code that has already made the corresponding
    /// ready-queue change and knows the transition is valid (e.g. waking a
    /// delayed task it just re-enqueued).
    pub fn force_state(&mut self, state: TaskState) {
        self.state = state;
    }

    pub fn params(&self) -> SchedulingParams {
        self.params
    }

    pub fn stack(&self) -> Option<&StackInfo> {
        self.stack.as_ref()
    }

    pub fn stack_mut(&mut self) -> Option<&mut StackInfo> {
        self.stack.as_mut()
    }

    pub fn stack_pointer(&self) -> *mut u8 {
        self.stack_pointer
    }

    pub fn set_stack_pointer(&mut self, sp: *mut u8) {
        self.stack_pointer = sp;
    }

    pub fn time_slice_remaining(&self) -> u32 {
        self.time_slice_remaining
    }

    pub fn set_time_slice_remaining(&mut self, ticks: u32) {
        self.time_slice_remaining = ticks;
    }

    pub fn arrival(&self) -> Instant {
        self.arrival
    }

    pub fn wait_chain(&self) -> Option<u16> {
        self.wait_chain
    }

    pub fn set_wait_chain(&mut self, chain: Option<u16>) {
        self.wait_chain = chain;
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn delay_until(&self) -> Option<u64> {
        self.delay_until
    }

    pub fn set_delay_until(&mut self, wake_tick: Option<u64>) {
        self.delay_until = wake_tick;
    }

    /// Records `state` as the state to return to on `resume()`, leaving
    /// the TCB's actual `state` field untouched — callers transition that
    /// separately, typically to `Suspended`.
    fn set_pre_suspend_state(&mut self, state: TaskState) {
        self.pre_suspend_state = Some(state);
    }

    /// Takes and clears the state recorded by `set_pre_suspend_state`, if
    /// any.
    fn take_pre_suspend_state(&mut self) -> Option<TaskState> {
        self.pre_suspend_state.take()
    }
}

/// Fixed-capacity arena of task control blocks, slot 0 reserved for the
/// idle task (SPEC_FULL.md "idle task / idle sentinel"; mirrors
/// `eqos::scheduler::Scheduler` reserving index 0).
pub struct TaskArena<const MAX_TASKS: usize> {
    slots: [TaskControlBlock; MAX_TASKS],
    occupied: [bool; MAX_TASKS],
    count: u16,
}

/// Reserved arena slot for the idle task, created by `Kernel::new`.
pub const IDLE_SLOT: usize = 0;

/// The production task arena, sized by `config::MAX_TASKS`.
pub type Tasks = TaskArena<{ crate::config::MAX_TASKS }>;

impl<const MAX_TASKS: usize> TaskArena<MAX_TASKS> {
    pub const fn new() -> Self {
        Self {
            slots: [TaskControlBlock::empty(0); MAX_TASKS],
            occupied: [false; MAX_TASKS],
            count: 0,
        }
    }

    /// Creates a new dormant task in a free slot other than `IDLE_SLOT`,
    /// returning its handle.
    pub fn create(
        &mut self,
        base_priority: u16,
        params: SchedulingParams,
        stack: StackInfo,
        stack_pointer: *mut u8,
        now: Instant,
    ) -> Result<TaskId, Error> {
        for i in 1..MAX_TASKS {
            if !self.occupied[i] {
                let generation = self.slots[i].generation.wrapping_add(1);
                self.slots[i] = TaskControlBlock {
                    state: TaskState::Dormant,
                    base_priority,
                    effective_priority: base_priority,
                    stack: Some(stack),
                    stack_pointer,
                    params,
                    time_slice_remaining: 0,
                    arrival: now,
                    wait_chain: None,
                    pre_suspend_state: None,
                    restart_count: 0,
                    delay_until: None,
                    active: true,
                    generation,
                };
                self.occupied[i] = true;
                self.count += 1;
                return Ok(TaskId::new(i as u16, generation));
            }
        }
        Err(Error::new(Kind::TaskTableFull))
    }

    /// Installs the idle task at the reserved slot. Called exactly once by
    /// `Kernel::new`.
    pub fn install_idle(&mut self, stack: StackInfo, stack_pointer: *mut u8, now: Instant) -> TaskId {
        let generation = self.slots[IDLE_SLOT].generation.wrapping_add(1);
        self.slots[IDLE_SLOT] = TaskControlBlock {
            state: TaskState::Ready,
            base_priority: u16::MAX,
            effective_priority: u16::MAX,
            stack: Some(stack),
            stack_pointer,
            params: SchedulingParams::default(),
            time_slice_remaining: 0,
            arrival: now,
            wait_chain: None,
            pre_suspend_state: None,
            restart_count: 0,
            delay_until: None,
            active: true,
            generation,
        };
        self.occupied[IDLE_SLOT] = true;
        TaskId::new(IDLE_SLOT as u16, generation)
    }

    pub fn get(&self, id: TaskId) -> Result<&TaskControlBlock, Error> {
        self.check(id)?;
        Ok(&self.slots[id.index()])
    }

    /// Looks up a TCB by raw arena slot, skipping the generation check.
    /// Only for use by kernel-internal code (the scheduler hot path, the
    /// switch engine) operating on slots it just read out of the ready
    /// queue, which by construction can only ever hold live occupants.
    /// External callers must go through `get`/`get_mut`.
    pub fn get_by_slot(&self, slot: u16) -> Option<&TaskControlBlock> {
        if (slot as usize) < MAX_TASKS && self.occupied[slot as usize] {
            Some(&self.slots[slot as usize])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut TaskControlBlock, Error> {
        self.check(id)?;
        Ok(&mut self.slots[id.index()])
    }

    /// Mutable counterpart to `get_by_slot`; same generation-skipping
    /// caveat applies.
    pub fn get_mut_by_slot(&mut self, slot: u16) -> Option<&mut TaskControlBlock> {
        if (slot as usize) < MAX_TASKS && self.occupied[slot as usize] {
            Some(&mut self.slots[slot as usize])
        } else {
            None
        }
    }

    fn check(&self, id: TaskId) -> Result<(), Error> {
        if id.index() >= MAX_TASKS
            || !self.occupied[id.index()]
            || self.slots[id.index()].generation != id.generation()
        {
            return Err(Error::new(Kind::InvalidTaskId));
        }
        Ok(())
    }

    /// Transitions a dormant task to Ready. Cannot be applied to anything
    /// but a dormant task.
    pub fn activate(&mut self, id: TaskId) -> Result<(), Error> {
        let tcb = self.get_mut(id)?;
        if tcb.state != TaskState::Dormant {
            return Err(Error::new(Kind::TaskNotDormant));
        }
        tcb.state = TaskState::Ready;
        Ok(())
    }

    pub fn set_state(&mut self, id: TaskId, state: TaskState) -> Result<(), Error> {
        self.get_mut(id)?.state = state;
        Ok(())
    }

    /// Forces a task out of scheduling contention regardless of its
    /// current state, remembering what that state was so `resume` can put
    /// it back. A task already Suspended or Terminated cannot be
    /// suspended again.
    pub fn suspend(&mut self, id: TaskId) -> Result<(), Error> {
        let tcb = self.get_mut(id)?;
        match tcb.state {
            TaskState::Suspended | TaskState::Terminated => {
                return Err(Error::new(Kind::TaskNotReady))
            }
            prior => {
                tcb.set_pre_suspend_state(prior);
                tcb.state = TaskState::Suspended;
            }
        }
        Ok(())
    }

    /// Restores a task suspended by `suspend` to the state it was in
    /// beforehand. Fails if the task is not currently Suspended.
    pub fn resume(&mut self, id: TaskId) -> Result<(), Error> {
        let tcb = self.get_mut(id)?;
        if tcb.state != TaskState::Suspended {
            return Err(Error::new(Kind::TaskNotReady));
        }
        tcb.state = tcb.take_pre_suspend_state().unwrap_or(TaskState::Ready);
        Ok(())
    }

    /// Resets a task to Dormant so it can be re-activated from scratch,
    /// bumping its restart counter. Rejected once `max_restarts` has
    /// already been reached, so a task that keeps faulting on entry
    /// cannot restart forever.
    pub fn restart(&mut self, id: TaskId, max_restarts: u32) -> Result<(), Error> {
        let tcb = self.get_mut(id)?;
        if tcb.restart_count >= max_restarts {
            return Err(Error::new(Kind::RestartLimitExceeded));
        }
        tcb.restart_count += 1;
        tcb.state = TaskState::Dormant;
        tcb.pre_suspend_state = None;
        tcb.wait_chain = None;
        tcb.effective_priority = tcb.base_priority;
        Ok(())
    }

    pub fn set_priority(&mut self, id: TaskId, priority: u16) -> Result<(), Error> {
        let tcb = self.get_mut(id)?;
        tcb.base_priority = priority;
        tcb.effective_priority = priority;
        Ok(())
    }

    /// Releases a task's slot back to the free pool. The slot's generation
    /// was already bumped at the most recent `create`/`install_idle`; the
    /// next occupant bumps it again, so any handle captured before this
    /// call compares unequal to the new occupant.
    pub fn destroy(&mut self, id: TaskId) -> Result<(), Error> {
        self.check(id)?;
        self.occupied[id.index()] = false;
        self.slots[id.index()].active = false;
        self.count -= 1;
        Ok(())
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn capacity(&self) -> usize {
        MAX_TASKS
    }

    /// Number of occupied slots currently in `state`. Used by the
    /// integrity checker to cross-check the ready queue's enqueued count.
    pub fn count_in_state(&self, state: TaskState) -> usize {
        (0..MAX_TASKS)
            .filter(|&i| self.occupied[i] && self.slots[i].state == state)
            .count()
    }
}

impl<const MAX_TASKS: usize> Default for TaskArena<MAX_TASKS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_stack() -> StackInfo {
        // StackInfo has no public constructor outside `init`; tests here
        // only exercise arena bookkeeping, so a null/zero-length region is
        // fine as long as it is never dereferenced.
        static mut BUF: [u8; 64] = [0; 64];
        #[allow(static_mut_refs)]
        let region = dsrtos_core::port::StackRegion {
            base: unsafe { BUF.as_mut_ptr() },
            size: 64,
        };
        struct NoopPort;
        unsafe impl dsrtos_core::port::Port for NoopPort {
            type CriticalToken = ();
            fn enter_critical(&self) {}
            unsafe fn exit_critical(&self, _t: ()) {}
            unsafe fn init_stack_frame(
                &self,
                r: dsrtos_core::port::StackRegion,
                _e: extern "C" fn(usize) -> !,
                _a: usize,
            ) -> *mut u8 {
                r.base
            }
            fn request_switch(&self) {}
            fn idle(&self) {}
        }
        extern "C" fn entry(_a: usize) -> ! {
            loop {}
        }
        let (info, _sp) = unsafe {
            StackInfo::init(&NoopPort, region, entry, 0, &crate::config::KernelConfig::default_small())
                .unwrap()
        };
        info
    }

    #[test]
    fn create_then_activate() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        assert_eq!(arena.get(id).unwrap().state(), TaskState::Dormant);
        arena.activate(id).unwrap();
        assert_eq!(arena.get(id).unwrap().state(), TaskState::Ready);
    }

    #[test]
    fn activating_twice_fails() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        arena.activate(id).unwrap();
        assert_eq!(arena.activate(id).unwrap_err().kind(), Kind::TaskNotDormant);
    }

    #[test]
    fn destroyed_handle_is_rejected_after_slot_reuse() {
        let mut arena: TaskArena<2> = TaskArena::new();
        let a = arena
            .create(1, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        arena.destroy(a).unwrap();
        let b = arena
            .create(1, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        assert_ne!(a, b);
        assert!(arena.get(a).is_err());
        assert!(arena.get(b).is_ok());
    }

    #[test]
    fn suspend_then_resume_restores_prior_state() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        arena.activate(id).unwrap();
        arena.suspend(id).unwrap();
        assert_eq!(arena.get(id).unwrap().state(), TaskState::Suspended);
        arena.resume(id).unwrap();
        assert_eq!(arena.get(id).unwrap().state(), TaskState::Ready);
    }

    #[test]
    fn resuming_a_task_that_is_not_suspended_fails() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        assert!(arena.resume(id).is_err());
    }

    #[test]
    fn restart_resets_to_dormant_and_counts_attempts() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        arena.activate(id).unwrap();
        arena.restart(id, 3).unwrap();
        assert_eq!(arena.get(id).unwrap().state(), TaskState::Dormant);
        assert_eq!(arena.get(id).unwrap().restart_count(), 1);
    }

    #[test]
    fn restart_is_rejected_once_the_cap_is_reached() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        arena.restart(id, 2).unwrap();
        arena.restart(id, 2).unwrap();
        assert_eq!(arena.restart(id, 2).unwrap_err().kind(), Kind::RestartLimitExceeded);
    }

    #[test]
    fn set_priority_updates_base_and_effective() {
        let mut arena: TaskArena<4> = TaskArena::new();
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        arena.set_priority(id, 9).unwrap();
        assert_eq!(arena.get(id).unwrap().base_priority(), 9);
        assert_eq!(arena.get(id).unwrap().effective_priority(), 9);
    }

    #[test]
    fn get_mut_by_slot_rejects_unoccupied_slots() {
        let mut arena: TaskArena<4> = TaskArena::new();
        assert!(arena.get_mut_by_slot(1).is_none());
        let id = arena
            .create(5, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        assert!(arena.get_mut_by_slot(id.index() as u16).is_some());
    }

    #[test]
    fn table_full_is_reported() {
        let mut arena: TaskArena<2> = TaskArena::new();
        arena
            .create(1, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0))
            .unwrap();
        let err = arena.create(1, SchedulingParams::default(), dummy_stack(), core::ptr::null_mut(), Instant::from_ticks(0));
        assert_eq!(err.unwrap_err().kind(), Kind::TaskTableFull);
    }
}
