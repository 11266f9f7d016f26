//! Priority inheritance, the priority-ceiling protocol, and aging.
//!
//! `r3_kernel::mutex` implements ceiling-protocol inheritance by walking
//! `last_mutex_held`, a singly-linked list of mutexes threaded through
//! each task, and taking the minimum ceiling over the chain
//! (`evaluate_task_effective_priority`). That "min over held resources"
//! rule is reused directly. The *blocking* side — task A blocked on a
//! resource held by B, B blocked on one held by C — is rebuilt as an
//! explicit bounded pool of chain nodes rather than `r3_kernel`'s
//! intrusive per-task back-pointers, so the depth bound is a pool
//! capacity check instead of a runtime walk limit.

use dsrtos_core::error::{Error, Kind};
use dsrtos_core::ids::{ResourceId, TaskId};

use crate::config::MAX_INHERITANCE_DEPTH;

/// A lockable resource participating in priority inheritance/ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Resource {
    owner: Option<TaskId>,
    /// Priority ceiling: no task holding this resource may run below this
    /// priority level while it is held (lower number = more urgent).
    ceiling: u16,
}

impl Resource {
    pub const fn new(ceiling: u16) -> Self {
        Self {
            owner: None,
            ceiling,
        }
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    pub fn ceiling(&self) -> u16 {
        self.ceiling
    }
}

/// One link in a blocking chain: `blocked` is waiting on `resource`, which
/// is held (directly or transitively) by whoever owns the chain.
#[derive(Debug, Clone, Copy)]
struct ChainNode {
    blocked: TaskId,
    resource: ResourceId,
    next: Option<u16>,
}

/// Bounded pool of inheritance-chain nodes. A chain longer than
/// `MAX_INHERITANCE_DEPTH` is truncated: the kernel still boosts every
/// task within the depth bound, and raises `Kind::ChainPoolExhausted` as
/// a non-fatal diagnostic rather than blocking the lock.
pub struct ChainPool<const N: usize> {
    nodes: [Option<ChainNode>; N],
}

impl<const N: usize> ChainPool<N> {
    pub const fn new() -> Self {
        Self { nodes: [None; N] }
    }

    fn alloc(&mut self, node: ChainNode) -> Option<u16> {
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(node);
                return Some(i as u16);
            }
        }
        None
    }

    fn free(&mut self, index: u16) {
        self.nodes[index as usize] = None;
    }
}

impl<const N: usize> Default for ChainPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks resources and the blocking chains through them, and computes
/// effective priorities.
pub struct PriorityManager<const MAX_RESOURCES: usize, const MAX_CHAIN: usize, const MAX_TASKS: usize> {
    resources: [Option<Resource>; MAX_RESOURCES],
    chains: ChainPool<MAX_CHAIN>,
    /// Resource each task is presently blocked on, indexed by task slot.
    /// Lets `record_block` walk the chain transitively: if the owner of
    /// the resource a task wants is itself blocked, that owner's entry
    /// here is the next link.
    blocked_on: [Option<ResourceId>; MAX_TASKS],
}

impl<const MAX_RESOURCES: usize, const MAX_CHAIN: usize, const MAX_TASKS: usize>
    PriorityManager<MAX_RESOURCES, MAX_CHAIN, MAX_TASKS>
{
    pub const fn new() -> Self {
        Self {
            resources: [None; MAX_RESOURCES],
            chains: ChainPool::new(),
            blocked_on: [None; MAX_TASKS],
        }
    }

    pub fn create_resource(&mut self, ceiling: u16) -> Result<ResourceId, Error> {
        for (i, slot) in self.resources.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Resource::new(ceiling));
                return Ok(ResourceId::new(i as u16, 0));
            }
        }
        Err(Error::new(Kind::ChainPoolExhausted))
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource, Error> {
        self.resources
            .get_mut(id.index())
            .and_then(|r| r.as_mut())
            .ok_or_else(|| Error::new(Kind::InvalidResourceId))
    }

    pub fn resource(&self, id: ResourceId) -> Result<&Resource, Error> {
        self.resources
            .get(id.index())
            .and_then(|r| r.as_ref())
            .ok_or_else(|| Error::new(Kind::InvalidResourceId))
    }

    /// Locks `resource` for `owner`. Succeeds unconditionally here; the
    /// caller (kernel.rs) is responsible for blocking the task first if
    /// the resource was already held, then calling this once ownership is
    /// free. Returns the owner's new effective priority (the minimum of
    /// its base priority and every ceiling it now holds).
    pub fn acquire(
        &mut self,
        resource: ResourceId,
        owner: TaskId,
        owner_base_priority: u16,
        held_ceilings: impl Iterator<Item = u16>,
    ) -> Result<u16, Error> {
        let ceiling = self.resource(resource)?.ceiling();
        if self.resource(resource)?.owner().is_some() {
            return Err(Error::new(Kind::TaskAlreadyActive));
        }
        self.resource_mut(resource)?.owner = Some(owner);
        let min_ceiling = held_ceilings.chain(core::iter::once(ceiling)).min().unwrap_or(ceiling);
        Ok(owner_base_priority.min(min_ceiling))
    }

    /// Releases `resource`, recomputing the owner's effective priority
    /// from whatever it still holds.
    pub fn release(
        &mut self,
        resource: ResourceId,
        owner_base_priority: u16,
        remaining_ceilings: impl Iterator<Item = u16>,
    ) -> Result<u16, Error> {
        self.resource_mut(resource)?.owner = None;
        Ok(remaining_ceilings.min().map_or(owner_base_priority, |c| owner_base_priority.min(c)))
    }

    /// Records that `blocked` is waiting on `resource`, then walks the
    /// transitive blocking chain: if `resource`'s owner is itself blocked
    /// on some other resource, that owner-resource pair becomes the next
    /// link, and so on until an unblocked owner is reached or
    /// `MAX_INHERITANCE_DEPTH` links have been recorded. Returns the chain
    /// depth actually created (the head of the chain, usable with
    /// `release_chain`, is the first link allocated).
    pub fn record_block(&mut self, blocked: TaskId, resource: ResourceId) -> Result<(u16, u16), Error> {
        if let Some(slot) = self.blocked_on.get_mut(blocked.index()) {
            *slot = Some(resource);
        }

        let mut depth = 0u16;
        let mut head: Option<u16> = None;
        let mut tail: Option<u16> = None;
        let mut current_blocked = blocked;
        let mut current_resource = resource;

        loop {
            if depth >= MAX_INHERITANCE_DEPTH as u16 {
                break;
            }
            let idx = match self.chains.alloc(ChainNode {
                blocked: current_blocked,
                resource: current_resource,
                next: None,
            }) {
                Some(idx) => idx,
                None => {
                    if head.is_none() {
                        return Err(Error::new(Kind::ChainPoolExhausted));
                    }
                    break;
                }
            };
            if let Some(prev) = tail {
                if let Some(Some(node)) = self.chains.nodes.get_mut(prev as usize) {
                    node.next = Some(idx);
                }
            }
            tail = Some(idx);
            if head.is_none() {
                head = Some(idx);
            }
            depth += 1;

            let owner = self.resource(current_resource).ok().and_then(|r| r.owner());
            let owner = match owner {
                Some(o) => o,
                None => break,
            };
            let owner_blocked_on = self.blocked_on.get(owner.index()).copied().flatten();
            match owner_blocked_on {
                Some(next_resource) => {
                    current_blocked = owner;
                    current_resource = next_resource;
                }
                None => break,
            }
        }

        match head {
            Some(h) => Ok((h, depth)),
            None => Err(Error::new(Kind::ChainPoolExhausted)),
        }
    }

    /// Resource `task` is currently blocked on, if any. Lets a caller
    /// continue walking the inheritance chain one link past what
    /// `record_block` already traversed (e.g. after a new `acquire`
    /// changes an owner downstream).
    pub fn blocked_on(&self, task: TaskId) -> Option<ResourceId> {
        self.blocked_on.get(task.index()).copied().flatten()
    }

    /// Clears the blocked-on record for `task`, called once it is woken
    /// and granted the resource it was waiting for.
    pub fn clear_blocked(&mut self, task: TaskId) {
        if let Some(slot) = self.blocked_on.get_mut(task.index()) {
            *slot = None;
        }
    }

    /// Releases all chain nodes rooted at `handle` (called once a blocked
    /// task is woken and granted the resource).
    pub fn release_chain(&mut self, handle: u16) {
        let mut current = Some(handle);
        while let Some(idx) = current {
            let next = self.chains.nodes[idx as usize].and_then(|n| n.next);
            self.chains.free(idx);
            current = next;
        }
    }

    /// Applies an aging boost (only compiled when `priority_aging` is
    /// enabled): a task that has waited `ticks_waited` ticks without
    /// running has its effective priority raised by one level per
    /// `aging_interval` ticks, never past `floor`.
    #[cfg(feature = "priority_aging")]
    pub fn aged_priority(base: u16, ticks_waited: u32, aging_interval: u32, floor: u16) -> u16 {
        if aging_interval == 0 {
            return base;
        }
        let boost = (ticks_waited / aging_interval) as u16;
        base.saturating_sub(boost).max(floor)
    }
}

impl<const MAX_RESOURCES: usize, const MAX_CHAIN: usize, const MAX_TASKS: usize> Default
    for PriorityManager<MAX_RESOURCES, MAX_CHAIN, MAX_TASKS>
{
    fn default() -> Self {
        Self::new()
    }
}

/// The production priority manager, sized by `config::MAX_RESOURCES` /
/// `config::MAX_CHAIN_NODES` / `config::MAX_TASKS`.
pub type Priorities = PriorityManager<
    { crate::config::MAX_RESOURCES },
    { crate::config::MAX_CHAIN_NODES },
    { crate::config::MAX_TASKS },
>;
