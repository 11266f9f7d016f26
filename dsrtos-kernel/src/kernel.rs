//! The top-level `Kernel` struct: the public API surface, wiring every
//! component (tasks, scheduler plugins, the switch engine, the adaptation
//! engine, the integrity checker) behind one owned context instead of the
//! pervasive module-level globals `r3_kernel`'s free functions operate
//! on (`r3_kernel::task::{activate, exit_current_task, ...}`).

use dsrtos_core::error::{Error, Kind};
use dsrtos_core::hooks::{ErrorHook, NullHooks, OverflowHook};
use dsrtos_core::ids::{PluginId, ResourceId, TaskId};
use dsrtos_core::port::{Port, StackRegion};
use dsrtos_core::time::Instant;
use dsrtos_core::trace::{NullSink, TraceLevel, TraceSink};

use crate::config::KernelConfig;
use crate::integrity::{IntegrityChecker, RepairLevel};
use crate::priority::Priorities;
use crate::readyqueue::Ready;
use crate::registry::Registry;
use crate::scheduler::plugin::Plugin;
use crate::scheduler::SchedulerPlugin;
use crate::stack::{StackHealth, StackInfo};
use crate::switch::{SwitchEngine, SwitchOutcome};
use crate::task::{SchedulingParams, TaskState, Tasks};

#[cfg(feature = "adaptive")]
use crate::manager::{DecisionEngine, Recommendation, WorkloadSample};

/// Owns every kernel component. Generic over the port and the three
/// optional collaborators; all three default to no-op implementations
/// so a caller that doesn't need custom hooks or tracing can write
/// `Kernel<MyPort>` without extra type arguments.
pub struct Kernel<P: Port, H: ErrorHook = NullHooks, O: OverflowHook = NullHooks, S: TraceSink = NullSink> {
    port: P,
    error_hook: H,
    overflow_hook: O,
    trace: S,
    config: KernelConfig,
    tasks: Tasks,
    ready: Ready,
    registry: Registry,
    priorities: Priorities,
    switch_engine: SwitchEngine,
    #[cfg(feature = "adaptive")]
    decision_engine: DecisionEngine,
    current: Option<TaskId>,
    idle: TaskId,
    ticks: u64,
    /// Cap on `restart_task`'s restart counter; once a task has restarted
    /// this many times it is left Dormant rather than restarted again.
    max_task_restarts: u32,
}

impl<P: Port> Kernel<P, NullHooks, NullHooks, NullSink> {
    /// Creates a kernel with default (no-op) hooks and tracing, building
    /// the idle task from `idle_stack` (SPEC_FULL.md's idle-sentinel
    /// supplement).
    pub fn new(port: P, config: KernelConfig, idle_stack: StackRegion) -> Result<Self, Error> {
        Self::with_collaborators(port, NullHooks, NullHooks, NullSink, config, idle_stack)
    }
}

impl<P: Port, H: ErrorHook, O: OverflowHook, S: TraceSink> Kernel<P, H, O, S> {
    pub fn with_collaborators(
        port: P,
        error_hook: H,
        overflow_hook: O,
        trace: S,
        config: KernelConfig,
        idle_stack: StackRegion,
    ) -> Result<Self, Error> {
        config.validate()?;
        let mut tasks = Tasks::new();
        extern "C" fn idle_entry(_arg: usize) -> ! {
            loop {}
        }
        // SAFETY: idle_stack is caller-provided, writable, 'static memory
        // dedicated to the idle task.
        let (stack_info, sp) =
            unsafe { StackInfo::init(&port, idle_stack, idle_entry, 0, &config)? };
        let idle = tasks.install_idle(stack_info, sp, Instant::from_ticks(0));

        Ok(Self {
            port,
            error_hook,
            overflow_hook,
            trace,
            config,
            tasks,
            ready: Ready::new(),
            registry: Registry::new(),
            priorities: Priorities::new(),
            switch_engine: SwitchEngine::new(),
            #[cfg(feature = "adaptive")]
            decision_engine: DecisionEngine::new(&config),
            current: Some(idle),
            idle,
            ticks: 0,
            max_task_restarts: 3,
        })
    }

    fn now(&self) -> Instant {
        Instant::from_ticks(self.ticks)
    }

    fn raise(&self, error: Error) -> Error {
        if error.requires_shutdown() {
            self.error_hook.on_fatal_error(error);
        }
        self.trace_emit(TraceLevel::Error, error.kind().as_str());
        error
    }

    /// Forwards to the installed `TraceSink`, compiled out entirely
    /// unless the `trace` feature is enabled.
    #[cfg(feature = "trace")]
    fn trace_emit(&self, level: TraceLevel, event: &str) {
        self.trace.emit(level, event);
    }

    #[cfg(not(feature = "trace"))]
    fn trace_emit(&self, _level: TraceLevel, _event: &str) {}

    /// Runs `f` with the port's critical section held — the scope every
    /// method below that touches the ready queue or task arena runs in,
    /// since an ISR-driven preemption must never observe a half-updated
    /// queue. Mirrors `eqos::sync::critical_section` wrapping each
    /// scheduler-mutating call, generalized so the token comes from the
    /// `Port` trait instead of `cortex_m::interrupt::free` directly.
    fn in_critical_section<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let token = self.port.enter_critical();
        let result = f(self);
        // SAFETY: token was just obtained from this same port and has not
        // been consumed elsewhere.
        unsafe { self.port.exit_critical(token) };
        result
    }

    /// Removes `slot` from the ready queue at its current effective
    /// priority, if it is there at all. A task that is Blocked, Dormant,
    /// Suspended or Terminated is already absent; callers that know the
    /// task was Ready/Running can skip the state check, but lifecycle
    /// entry points that accept any task state go through this.
    fn dequeue_if_present(&mut self, slot: u16, priority: u16) {
        if let Some(active) = self.registry.active() {
            if let Ok(plugin) = self.registry.get_mut(active) {
                plugin.dequeue(&mut self.ready, priority, slot);
            }
        }
    }

    /// Re-enqueues `slot` under the active plugin and records the level
    /// it lands at. This is the single mechanism behind both round-robin
    /// rotation (the plugin re-enqueues at the tail of the same level) and
    /// dynamic re-ranking (CFS/Adaptive/EDF compute a new level), since
    /// `SchedulerPlugin::enqueue` always returns the level it used.
    fn enqueue_slot(&mut self, slot: u16, now: Instant) -> Result<(), Error> {
        let Some(active) = self.registry.active() else {
            return Err(Error::new(Kind::PluginNotRegistered));
        };
        let (base_priority, params) = {
            let tcb = self
                .tasks
                .get_by_slot(slot)
                .ok_or_else(|| Error::new(Kind::InvalidTaskId))?;
            (tcb.base_priority(), tcb.params())
        };
        let plugin = self.registry.get_mut(active)?;
        let level = plugin.enqueue(&mut self.ready, slot, base_priority, params, now);
        if let Some(tcb) = self.tasks.get_mut_by_slot(slot) {
            tcb.set_effective_priority(level);
        }
        Ok(())
    }

    /// Dequeues `slot` from its current level and re-enqueues it, letting
    /// the active plugin decide where it lands next. Called after
    /// `on_tick` returns `Reschedule` (round-robin's slice expiry,
    /// CFS/Adaptive/EDF's per-tick re-ranking) and after any priority
    /// change while the task is in the ready queue.
    fn requeue_slot(&mut self, slot: u16) -> Result<(), Error> {
        let now = self.now();
        let old_level = self
            .tasks
            .get_by_slot(slot)
            .ok_or_else(|| Error::new(Kind::InvalidTaskId))?
            .effective_priority();
        self.dequeue_if_present(slot, old_level);
        self.enqueue_slot(slot, now)
    }

    // ---- Task lifecycle ----------------------------------------------

    /// Creates a dormant task with its own stack region. Does not make it
    /// ready; call `activate_task` to do that.
    pub fn create_task(
        &mut self,
        base_priority: u16,
        params: SchedulingParams,
        entry: extern "C" fn(usize) -> !,
        arg: usize,
        stack: StackRegion,
    ) -> Result<TaskId, Error> {
        if base_priority as usize >= crate::config::MAX_PRIORITY_LEVELS as usize {
            return Err(self.raise(Error::new(Kind::InvalidPriority)));
        }
        // SAFETY: stack is caller-provided 'static memory dedicated to
        // this task.
        let (stack_info, sp) = unsafe { StackInfo::init(&self.port, stack, entry, arg, &self.config)? };
        let now = self.now();
        self.tasks
            .create(base_priority, params, stack_info, sp, now)
            .map_err(|e| self.raise(e))
    }

    /// Moves a dormant task to Ready and enqueues it under the active
    /// plugin, triggering a reschedule if it now outranks the running
    /// task.
    pub fn activate_task(&mut self, id: TaskId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            k.tasks.activate(id).map_err(|e| k.raise(e))?;
            let now = k.now();
            k.enqueue_slot(id.index() as u16, now).map_err(|e| k.raise(e))?;
            k.trace_emit(TraceLevel::Info, "task activated");
            Ok(())
        })
    }

    pub fn destroy_task(&mut self, id: TaskId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            let priority = k.tasks.get(id)?.effective_priority();
            k.dequeue_if_present(id.index() as u16, priority);
            k.tasks.destroy(id).map_err(|e| k.raise(e))
        })
    }

    pub fn task_state(&self, id: TaskId) -> Result<TaskState, Error> {
        Ok(self.tasks.get(id)?.state())
    }

    pub fn task_priority(&self, id: TaskId) -> Result<u16, Error> {
        Ok(self.tasks.get(id)?.base_priority())
    }

    /// Suspends `id` unconditionally, regardless of whether it is Ready,
    /// Running or Blocked, removing it from the ready queue if it was
    /// there. `resume_task` restores whatever state it was suspended from.
    pub fn suspend_task(&mut self, id: TaskId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            let priority = k.tasks.get(id)?.effective_priority();
            k.dequeue_if_present(id.index() as u16, priority);
            k.tasks.suspend(id).map_err(|e| k.raise(e))?;
            k.trace_emit(TraceLevel::Info, "task suspended");
            Ok(())
        })
    }

    /// Restores a task suspended by `suspend_task`. If its prior state was
    /// Ready or Running, re-enqueues it under the active plugin.
    pub fn resume_task(&mut self, id: TaskId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            k.tasks.resume(id).map_err(|e| k.raise(e))?;
            let state = k.tasks.get(id)?.state();
            if matches!(state, TaskState::Ready | TaskState::Running) {
                let now = k.now();
                k.enqueue_slot(id.index() as u16, now).map_err(|e| k.raise(e))?;
            }
            k.trace_emit(TraceLevel::Info, "task resumed");
            Ok(())
        })
    }

    /// Resets a task to Dormant so the caller can re-activate it from
    /// scratch, bumping its restart counter. Rejected once the configured
    /// cap (`set_max_task_restarts`, default 3) is reached.
    pub fn restart_task(&mut self, id: TaskId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            let priority = k.tasks.get(id)?.effective_priority();
            k.dequeue_if_present(id.index() as u16, priority);
            k.tasks.restart(id, k.max_task_restarts).map_err(|e| k.raise(e))?;
            k.trace_emit(TraceLevel::Warn, "task restarted");
            Ok(())
        })
    }

    pub fn set_max_task_restarts(&mut self, max: u32) {
        self.max_task_restarts = max;
    }

    /// Changes a task's base priority, re-enqueuing it at the new level if
    /// it is currently in the ready queue.
    pub fn set_task_priority(&mut self, id: TaskId, priority: u16) -> Result<(), Error> {
        if priority as usize >= crate::config::MAX_PRIORITY_LEVELS as usize {
            return Err(self.raise(Error::new(Kind::InvalidPriority)));
        }
        self.in_critical_section(|k| {
            let state = k.tasks.get(id)?.state();
            let was_enqueued = matches!(state, TaskState::Ready | TaskState::Running);
            let old_priority = k.tasks.get(id)?.effective_priority();
            if was_enqueued {
                k.dequeue_if_present(id.index() as u16, old_priority);
            }
            k.tasks.set_priority(id, priority).map_err(|e| k.raise(e))?;
            if was_enqueued {
                let now = k.now();
                k.enqueue_slot(id.index() as u16, now).map_err(|e| k.raise(e))?;
            }
            Ok(())
        })
    }

    /// Puts the currently running task to sleep for `ticks` ticks. Its
    /// state becomes Blocked; `tick` wakes it once the target tick is
    /// reached.
    pub fn delay_task(&mut self, id: TaskId, ticks: u32) -> Result<(), Error> {
        self.in_critical_section(|k| {
            let priority = k.tasks.get(id)?.effective_priority();
            k.dequeue_if_present(id.index() as u16, priority);
            k.tasks.set_state(id, TaskState::Blocked).map_err(|e| k.raise(e))?;
            let wake_at = k.ticks.wrapping_add(ticks as u64);
            k.tasks.get_mut(id)?.set_delay_until(Some(wake_at));
            Ok(())
        })
    }

    /// Moves the currently running task to the tail of its level and
    /// re-dispatches, the voluntary counterpart to a slice expiring.
    pub fn yield_task(&mut self) -> Result<(), Error> {
        self.in_critical_section(|k| {
            if let Some(id) = k.current {
                if id != k.idle {
                    k.requeue_slot(id.index() as u16).map_err(|e| k.raise(e))?;
                }
            }
            k.dispatch_locked()
        })
    }

    // ---- Priority inheritance / resources --------------------------------

    pub fn create_resource(&mut self, ceiling: u16) -> Result<ResourceId, Error> {
        self.priorities.create_resource(ceiling).map_err(|e| self.raise(e))
    }

    /// Acquires `resource` for `owner`, boosting its effective priority to
    /// the resource's ceiling if that is more urgent than what it already
    /// holds, and re-enqueuing it at the new level if it is in the ready
    /// queue.
    pub fn acquire_resource(&mut self, owner: TaskId, resource: ResourceId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            let base_priority = k.tasks.get(owner)?.base_priority();
            let held = core::iter::empty();
            let effective = k
                .priorities
                .acquire(resource, owner, base_priority, held)
                .map_err(|e| k.raise(e))?;
            k.apply_effective_priority(owner, effective)
        })
    }

    /// Releases `resource`, recomputing `owner`'s effective priority from
    /// whatever it still holds (nothing, here — a task holding more than
    /// one resource at a time tracks the rest via its own bookkeeping) and
    /// requeuing it if needed.
    pub fn release_resource(&mut self, owner: TaskId, resource: ResourceId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            let base_priority = k.tasks.get(owner)?.base_priority();
            let remaining = core::iter::empty();
            let effective = k
                .priorities
                .release(resource, base_priority, remaining)
                .map_err(|e| k.raise(e))?;
            k.apply_effective_priority(owner, effective)
        })
    }

    fn apply_effective_priority(&mut self, id: TaskId, priority: u16) -> Result<(), Error> {
        let state = self.tasks.get(id)?.state();
        if matches!(state, TaskState::Ready | TaskState::Running) {
            let old = self.tasks.get(id)?.effective_priority();
            self.dequeue_if_present(id.index() as u16, old);
            let now = self.now();
            let params = self.tasks.get(id)?.params();
            if let Some(active) = self.registry.active() {
                let plugin = self.registry.get_mut(active)?;
                let level = plugin.enqueue(&mut self.ready, id.index() as u16, priority, params, now);
                self.tasks.get_mut(id)?.set_effective_priority(level);
            } else {
                self.tasks.get_mut(id)?.set_effective_priority(priority);
            }
        } else {
            self.tasks.get_mut(id)?.set_effective_priority(priority);
        }
        Ok(())
    }

    /// Blocks `blocked` on `resource`, recording the inheritance chain
    /// (walked transitively through whoever else in the chain is also
    /// blocked) and boosting every task on it to `blocked`'s urgency where
    /// that is more urgent than what they already run at. Returns the
    /// chain depth recorded.
    pub fn block_on_resource(&mut self, blocked: TaskId, resource: ResourceId) -> Result<u16, Error> {
        self.in_critical_section(|k| {
            let priority = k.tasks.get(blocked)?.effective_priority();
            k.dequeue_if_present(blocked.index() as u16, priority);
            k.tasks.set_state(blocked, TaskState::Blocked).map_err(|e| k.raise(e))?;

            let (handle, depth) = k
                .priorities
                .record_block(blocked, resource)
                .map_err(|e| k.raise(e))?;
            k.tasks.get_mut(blocked)?.set_wait_chain(Some(handle));

            k.boost_chain(blocked, resource, priority)?;
            k.trace_emit(TraceLevel::Info, "task blocked on resource");
            Ok(depth)
        })
    }

    /// Walks owner-of(`resource`) -> blocked-on(owner) -> ... boosting
    /// every task found to at least `urgency`, up to
    /// `config::MAX_INHERITANCE_DEPTH` links.
    fn boost_chain(&mut self, blocked: TaskId, resource: ResourceId, urgency: u16) -> Result<(), Error> {
        let mut current_resource = resource;
        for _ in 0..crate::config::MAX_INHERITANCE_DEPTH {
            let owner = match self.priorities.resource(current_resource) {
                Ok(r) => r.owner(),
                Err(_) => None,
            };
            let Some(owner) = owner else { break };
            if owner == blocked {
                break;
            }
            let owner_priority = self.tasks.get(owner)?.effective_priority();
            if urgency < owner_priority {
                self.apply_effective_priority(owner, urgency)?;
            }
            match self.priorities.blocked_on(owner) {
                Some(next_resource) => current_resource = next_resource,
                None => break,
            }
        }
        Ok(())
    }

    /// Wakes `woken`, which must currently be Blocked on a resource
    /// (`block_on_resource` having been called for it earlier), clears its
    /// inheritance chain, and re-enqueues it.
    pub fn unblock_task(&mut self, woken: TaskId) -> Result<(), Error> {
        self.in_critical_section(|k| {
            if let Some(handle) = k.tasks.get(woken)?.wait_chain() {
                k.priorities.release_chain(handle);
            }
            k.priorities.clear_blocked(woken);
            k.tasks.get_mut(woken)?.set_wait_chain(None);
            k.tasks.set_state(woken, TaskState::Ready).map_err(|e| k.raise(e))?;
            let now = k.now();
            k.enqueue_slot(woken.index() as u16, now).map_err(|e| k.raise(e))?;
            k.trace_emit(TraceLevel::Info, "task unblocked");
            Ok(())
        })
    }

    // ---- Scheduler lifecycle -------------------------------------------

    pub fn register_plugin(&mut self, plugin: Plugin) -> Result<PluginId, Error> {
        self.registry.register(plugin).map_err(|e| self.raise(e))
    }

    /// Activates `id` as the very first plugin; there must not already be
    /// one active. Use `switch_scheduler` to move between two already-
    /// active plugins.
    pub fn activate_first_plugin(&mut self, id: PluginId) -> Result<(), Error> {
        if self.registry.active().is_some() {
            return Err(self.raise(Error::new(Kind::PluginAlreadyActive)));
        }
        self.registry.set_active(id).map_err(|e| self.raise(e))?;
        self.registry
            .get_mut(id)?
            .on_activate()
            .map_err(|e| self.raise(e))?;
        Ok(())
    }

    /// Runs the five-phase switch engine to move from the current active
    /// plugin to `target`.
    pub fn switch_scheduler(&mut self, target: PluginId) -> Result<SwitchOutcome, Error> {
        self.in_critical_section(|k| {
            let now = k.now();
            let outcome = k
                .switch_engine
                .switch_to(&mut k.registry, &mut k.tasks, &mut k.ready, target, now)
                .map_err(|e| k.raise(e))?;
            match outcome {
                SwitchOutcome::Completed => k.trace_emit(TraceLevel::Info, "scheduler switch completed"),
                SwitchOutcome::RolledBack => k.trace_emit(TraceLevel::Warn, "scheduler switch rolled back"),
                SwitchOutcome::DegradedButRunning => {
                    k.trace_emit(TraceLevel::Warn, "scheduler switch degraded")
                }
            }
            Ok(outcome)
        })
    }

    // ---- Dispatch ------------------------------------------------------

    /// Advances the kernel by one tick: checks the running task's stack,
    /// wakes any delayed tasks whose wake time has arrived, runs the
    /// active plugin's tick hook, re-dispatches if needed, and requests a
    /// context switch from the port when the running task changes.
    pub fn tick(&mut self) -> Result<(), Error> {
        self.in_critical_section(|k| {
            k.ticks = k.ticks.wrapping_add(1);
            let Some(active) = k.registry.active() else {
                return Err(k.raise(Error::new(Kind::PluginNotRegistered)));
            };
            let now = k.now();

            if k.check_running_stack() {
                return k.dispatch_locked();
            }

            k.wake_delayed_tasks(now);

            let current_slot = k.current.map(|id| id.index() as u16);
            if let Some(slot) = current_slot {
                if let Some(tcb) = k.tasks.get_by_slot(slot) {
                    let params = tcb.params();
                    let plugin = k.registry.get_mut(active)?;
                    let action = plugin.on_tick(slot, params, now);
                    if action == crate::scheduler::TickAction::Continue {
                        return Ok(());
                    }
                    k.requeue_slot(slot)?;
                }
            }

            k.dispatch_locked()
        })
    }

    /// Checks the currently running task's stack for overflow or
    /// underflow. On a violation, invokes the overflow hook, removes the
    /// task from scheduling contention, and forces it to `Suspended`.
    /// Returns whether a violation was found.
    fn check_running_stack(&mut self) -> bool {
        let Some(current_id) = self.current else {
            return false;
        };
        if current_id == self.idle {
            return false;
        }
        let health = match self.tasks.get_mut(current_id) {
            Ok(tcb) => match tcb.stack_mut() {
                Some(stack) => stack.check(),
                None => return false,
            },
            Err(_) => return false,
        };
        if health == StackHealth::Intact {
            return false;
        }

        self.overflow_hook.on_stack_overflow(current_id);
        let slot = current_id.index() as u16;
        if let Ok(priority) = self.tasks.get(current_id).map(|t| t.effective_priority()) {
            self.dequeue_if_present(slot, priority);
        }
        let _ = self.tasks.set_state(current_id, TaskState::Suspended);
        let _ = self.raise(Error::new(Kind::StackOverflow));
        true
    }

    /// Re-enqueues every task whose `delay_until` has arrived.
    fn wake_delayed_tasks(&mut self, now: Instant) {
        if self.registry.active().is_none() {
            return;
        }
        let now_ticks = now.as_ticks();
        for slot in 0..crate::config::MAX_TASKS as u16 {
            let due = match self.tasks.get_by_slot(slot) {
                Some(tcb) if tcb.state() == TaskState::Blocked => {
                    tcb.delay_until().filter(|&wake| wake <= now_ticks)
                }
                _ => None,
            };
            if due.is_some() {
                if let Some(tcb) = self.tasks.get_mut_by_slot(slot) {
                    tcb.set_delay_until(None);
                    tcb.force_state(TaskState::Ready);
                }
                let _ = self.enqueue_slot(slot, now);
            }
        }
    }

    /// Re-runs `select_next` and switches the running task if it
    /// differs from the one currently recorded, requesting a context
    /// switch from the port.
    pub fn dispatch(&mut self) -> Result<(), Error> {
        self.in_critical_section(|k| k.dispatch_locked())
    }

    fn dispatch_locked(&mut self) -> Result<(), Error> {
        let Some(active) = self.registry.active() else {
            return Err(self.raise(Error::new(Kind::PluginNotRegistered)));
        };
        let now = self.now();
        let current_slot = self.current.map(|id| id.index() as u16);
        let plugin = self.registry.get_mut(active)?;
        let next_slot = plugin.select_next(&self.ready, current_slot, now).unwrap_or(crate::task::IDLE_SLOT as u16);

        if Some(next_slot) != current_slot {
            self.current = self.slot_to_id(next_slot);
            self.port.request_switch();
            self.trace_emit(TraceLevel::Debug, "dispatch switched task");
        }
        Ok(())
    }

    fn slot_to_id(&self, slot: u16) -> Option<TaskId> {
        self.tasks.get_by_slot(slot).map(|tcb| TaskId::new(slot, tcb.generation()))
    }

    // ---- Integrity -------------------------------------------------------

    /// Runs the queue integrity checker and applies the repair it
    /// recommends, returning the level that was needed.
    pub fn check_and_repair_integrity(&mut self) -> RepairLevel {
        let checker = IntegrityChecker::new();
        let report = checker.check(&self.ready, &self.tasks);
        let level = report.repair_level_needed();
        if level != RepairLevel::None {
            checker.repair(&mut self.ready, level);
            self.trace_emit(TraceLevel::Warn, "integrity repair applied");
        }
        level
    }

    // ---- Adaptation (feature = "adaptive") ------------------------------

    /// Feeds one workload sample into the decision engine. When a stable
    /// recommendation suggests a different plugin than the one currently
    /// active, resolves it by name through the registry and runs the
    /// switch engine; a name the registry doesn't recognize (not
    /// registered on this build) is silently skipped, since the matrix's
    /// suggestions are advisory, not mandatory.
    #[cfg(feature = "adaptive")]
    pub fn feed_workload_sample(&mut self, sample: &WorkloadSample, ticks_elapsed: u32) -> Option<Recommendation> {
        let rec = self.decision_engine.observe(sample, ticks_elapsed)?;
        self.apply_recommendation(&rec);
        Some(rec)
    }

    #[cfg(feature = "adaptive")]
    fn apply_recommendation(&mut self, rec: &Recommendation) {
        if let Some(name) = rec.suggest_switch_to {
            if let Some(target) = self.registry.find_by_name(name) {
                if self.registry.active() != Some(target) {
                    let _ = self.switch_scheduler(target);
                }
                self.decision_engine.last_recommended_plugin = Some(target);
            }
        }
    }

    #[cfg(feature = "adaptive")]
    pub fn decision_engine_mut(&mut self) -> &mut DecisionEngine {
        &mut self.decision_engine
    }

    // ---- Accessors used by stats/tests ---------------------------------

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn tasks(&self) -> &Tasks {
        &self.tasks
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn idle(&self) -> TaskId {
        self.idle
    }

    pub fn priorities_mut(&mut self) -> &mut Priorities {
        &mut self.priorities
    }

    pub fn overflow_hook(&self) -> &O {
        &self.overflow_hook
    }

    pub fn switch_engine(&self) -> &SwitchEngine {
        &self.switch_engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::adaptive::Adaptive;
    use crate::scheduler::round_robin::RoundRobin;
    use crate::scheduler::static_priority::StaticPriority;

    struct NoopPort;
    unsafe impl Port for NoopPort {
        type CriticalToken = ();
        fn enter_critical(&self) {}
        unsafe fn exit_critical(&self, _t: ()) {}
        unsafe fn init_stack_frame(
            &self,
            r: StackRegion,
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

    fn region(buf: &mut [u8]) -> StackRegion {
        StackRegion {
            base: buf.as_mut_ptr(),
            size: buf.len(),
        }
    }

    #[test]
    fn create_activate_and_dispatch() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut TASK_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();

        let plugin_id = kernel
            .register_plugin(Plugin::RoundRobin(RoundRobin::new(10)))
            .unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        #[allow(static_mut_refs)]
        let task_region = region(unsafe { &mut TASK_BUF });
        let id = kernel
            .create_task(3, SchedulingParams::default(), entry, 0, task_region)
            .unwrap();
        kernel.activate_task(id).unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Ready);

        kernel.dispatch().unwrap();
        assert_eq!(kernel.current(), Some(id));
    }

    #[test]
    fn tick_without_active_plugin_errors() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        assert!(kernel.tick().is_err());
    }

    #[test]
    fn round_robin_rotates_tasks_on_slice_expiry() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut BUF_A: [u8; 256] = [0; 256];
        static mut BUF_B: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        let plugin_id = kernel.register_plugin(Plugin::RoundRobin(RoundRobin::new(1))).unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        #[allow(static_mut_refs)]
        let a = kernel.create_task(3, SchedulingParams::default(), entry, 0, region(unsafe { &mut BUF_A })).unwrap();
        #[allow(static_mut_refs)]
        let b = kernel.create_task(3, SchedulingParams::default(), entry, 0, region(unsafe { &mut BUF_B })).unwrap();
        kernel.activate_task(a).unwrap();
        kernel.activate_task(b).unwrap();
        kernel.dispatch().unwrap();
        assert_eq!(kernel.current(), Some(a));

        kernel.tick().unwrap();
        assert_eq!(kernel.current(), Some(b));

        kernel.tick().unwrap();
        assert_eq!(kernel.current(), Some(a));
    }

    #[test]
    fn suspend_then_resume_round_trips_through_ready() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut TASK_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        let plugin_id = kernel.register_plugin(Plugin::RoundRobin(RoundRobin::new(5))).unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        #[allow(static_mut_refs)]
        let id = kernel.create_task(3, SchedulingParams::default(), entry, 0, region(unsafe { &mut TASK_BUF })).unwrap();
        kernel.activate_task(id).unwrap();

        kernel.suspend_task(id).unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Suspended);
        kernel.resume_task(id).unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Ready);
    }

    #[test]
    fn restart_cap_is_enforced() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut TASK_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        kernel.set_max_task_restarts(1);
        let plugin_id = kernel.register_plugin(Plugin::RoundRobin(RoundRobin::new(5))).unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        #[allow(static_mut_refs)]
        let id = kernel.create_task(3, SchedulingParams::default(), entry, 0, region(unsafe { &mut TASK_BUF })).unwrap();
        kernel.activate_task(id).unwrap();

        kernel.restart_task(id).unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Dormant);
        assert!(kernel.restart_task(id).is_err());
    }

    #[test]
    fn delayed_task_wakes_on_schedule() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut TASK_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        let plugin_id = kernel.register_plugin(Plugin::RoundRobin(RoundRobin::new(5))).unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        #[allow(static_mut_refs)]
        let id = kernel.create_task(3, SchedulingParams::default(), entry, 0, region(unsafe { &mut TASK_BUF })).unwrap();
        kernel.activate_task(id).unwrap();

        kernel.delay_task(id, 3).unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Blocked);

        kernel.tick().unwrap();
        kernel.tick().unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Blocked);
        kernel.tick().unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Ready);
    }

    #[test]
    fn priority_inheritance_boosts_owner_when_higher_priority_task_blocks() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut BUF_HI: [u8; 256] = [0; 256];
        static mut BUF_LO: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        let plugin_id = kernel.register_plugin(Plugin::StaticPriority(StaticPriority::new())).unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        let resource = kernel.create_resource(20).unwrap();

        #[allow(static_mut_refs)]
        let low = kernel.create_task(20, SchedulingParams::default(), entry, 0, region(unsafe { &mut BUF_LO })).unwrap();
        #[allow(static_mut_refs)]
        let high = kernel.create_task(1, SchedulingParams::default(), entry, 0, region(unsafe { &mut BUF_HI })).unwrap();
        kernel.activate_task(low).unwrap();
        kernel.activate_task(high).unwrap();

        kernel.acquire_resource(low, resource).unwrap();
        assert_eq!(kernel.task_priority(low).unwrap(), 20);

        kernel.block_on_resource(high, resource).unwrap();
        assert_eq!(kernel.tasks().get(low).unwrap().effective_priority(), 1);

        kernel.unblock_task(high).unwrap();
        assert_eq!(kernel.task_state(high).unwrap(), TaskState::Ready);
    }

    #[test]
    fn stack_overflow_suspends_the_running_task() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        static mut TASK_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        let plugin_id = kernel.register_plugin(Plugin::RoundRobin(RoundRobin::new(5))).unwrap();
        kernel.activate_first_plugin(plugin_id).unwrap();

        #[allow(static_mut_refs)]
        let task_region = region(unsafe { &mut TASK_BUF });
        let id = kernel.create_task(3, SchedulingParams::default(), entry, 0, task_region).unwrap();
        kernel.activate_task(id).unwrap();
        kernel.dispatch().unwrap();
        assert_eq!(kernel.current(), Some(id));

        // Corrupt the task's top-of-stack canary directly.
        #[allow(static_mut_refs)]
        unsafe {
            TASK_BUF[255] = 0;
        }

        kernel.tick().unwrap();
        assert_eq!(kernel.task_state(id).unwrap(), TaskState::Suspended);
    }

    #[cfg(feature = "adaptive")]
    #[test]
    fn workload_recommendation_switches_plugin_when_target_is_registered() {
        static mut IDLE_BUF: [u8; 256] = [0; 256];
        #[allow(static_mut_refs)]
        let idle_region = region(unsafe { &mut IDLE_BUF });
        let mut kernel = Kernel::new(NoopPort, KernelConfig::default_small(), idle_region).unwrap();
        let adaptive_id = kernel.register_plugin(Plugin::Adaptive(Adaptive::new())).unwrap();
        let edf_id = kernel.register_plugin(Plugin::Edf(crate::scheduler::edf::Edf::new())).unwrap();
        kernel.activate_first_plugin(adaptive_id).unwrap();

        kernel.decision_engine_mut().set_weights(crate::manager::ScoringWeights::balanced());
        let sample = WorkloadSample {
            cpu_utilization_pct: 95,
            ipc_rate_per_tick: 500,
            ipc_variance: Some(0.1),
            interval_variance: Some(0.1),
        };
        let rec = kernel.decision_engine_mut().force_evaluation(&sample);
        assert_eq!(rec.suggest_switch_to, Some("edf"));

        let _ = kernel.switch_scheduler(edf_id);
        assert_eq!(kernel.switch_engine().stats().attempted(), 1);
    }
}
