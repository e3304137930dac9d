//! The four task pools in their natural containers.
//!
//! Pool membership is a tag, not a subtype: active and paused tasks live in
//! maps (no ordering semantics), resumed and pending tasks in FIFO queues
//! whose order is the admission order.

use crate::prelude::HashMap;
use crate::scheduler::task::{PoolKind, Task, TaskId};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct PoolSet {
    pub active: HashMap<TaskId, Task>,
    pub resumed: VecDeque<Task>,
    pub pending: VecDeque<Task>,
    pub paused: HashMap<TaskId, Task>,
}

impl PoolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of active costs, the numerator of UsedAttention.
    pub fn used_cost(&self) -> u64 {
        self.active.values().map(|t| u64::from(t.cost)).sum()
    }

    /// Which pool holds the task, if any.
    pub fn pool_of(&self, id: TaskId) -> Option<PoolKind> {
        if self.active.contains_key(&id) {
            Some(PoolKind::Active)
        } else if self.resumed.iter().any(|t| t.id == id) {
            Some(PoolKind::Resumed)
        } else if self.pending.iter().any(|t| t.id == id) {
            Some(PoolKind::Pending)
        } else if self.paused.contains_key(&id) {
            Some(PoolKind::Paused)
        } else {
            None
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.active
            .get(&id)
            .or_else(|| self.resumed.iter().find(|t| t.id == id))
            .or_else(|| self.pending.iter().find(|t| t.id == id))
            .or_else(|| self.paused.get(&id))
    }

    /// Remove the task from whichever pool holds it.
    pub fn remove(&mut self, id: TaskId) -> Option<(Task, PoolKind)> {
        if let Some(task) = self.active.remove(&id) {
            return Some((task, PoolKind::Active));
        }
        if let Some(pos) = self.resumed.iter().position(|t| t.id == id) {
            return self.resumed.remove(pos).map(|t| (t, PoolKind::Resumed));
        }
        if let Some(pos) = self.pending.iter().position(|t| t.id == id) {
            return self.pending.remove(pos).map(|t| (t, PoolKind::Pending));
        }
        if let Some(task) = self.paused.remove(&id) {
            return Some((task, PoolKind::Paused));
        }
        None
    }

    /// The head of the combined admission queue: resumed before pending.
    pub fn queue_head(&self) -> Option<&Task> {
        self.resumed.front().or_else(|| self.pending.front())
    }

    pub fn total_len(&self) -> usize {
        self.active.len() + self.resumed.len() + self.pending.len() + self.paused.len()
    }

    /// Highest id present across all pools, for re-seeding the allocator
    /// after a reload.
    pub fn max_id(&self) -> Option<TaskId> {
        self.active
            .keys()
            .copied()
            .chain(self.resumed.iter().map(|t| t.id))
            .chain(self.pending.iter().map(|t| t.id))
            .chain(self.paused.keys().copied())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskSpec;

    fn task(id: TaskId, cost: u32) -> Task {
        TaskSpec::new("test", cost, 1000).into_task(id)
    }

    #[test]
    fn test_pool_of_and_remove() {
        let mut pools = PoolSet::new();
        pools.active.insert(1, task(1, 2));
        pools.resumed.push_back(task(2, 1));
        pools.pending.push_back(task(3, 1));
        pools.paused.insert(4, task(4, 3));

        assert_eq!(pools.pool_of(1), Some(PoolKind::Active));
        assert_eq!(pools.pool_of(2), Some(PoolKind::Resumed));
        assert_eq!(pools.pool_of(3), Some(PoolKind::Pending));
        assert_eq!(pools.pool_of(4), Some(PoolKind::Paused));
        assert_eq!(pools.pool_of(9), None);

        assert_eq!(pools.used_cost(), 2);
        assert_eq!(pools.max_id(), Some(4));

        let (removed, from) = pools.remove(2).unwrap();
        assert_eq!(removed.id, 2);
        assert_eq!(from, PoolKind::Resumed);
        assert_eq!(pools.pool_of(2), None);
        assert!(pools.remove(2).is_none());
    }

    #[test]
    fn test_queue_head_prefers_resumed() {
        let mut pools = PoolSet::new();
        pools.pending.push_back(task(1, 1));
        assert_eq!(pools.queue_head().unwrap().id, 1);
        pools.resumed.push_back(task(2, 1));
        assert_eq!(pools.queue_head().unwrap().id, 2);
    }
}
