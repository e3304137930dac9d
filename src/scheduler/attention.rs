//! The attention scheduler.
//!
//! Holds, progresses and gates long-running tasks against a continuous
//! `[0, 1]` budget: at any moment the costs of the active pool sum to at
//! most the attention coefficient. Resumed tasks are admitted before
//! pending ones; an opt-in greedy pass may later backfill smaller tasks
//! past a queue head that does not fit.
//!
//! Admission passes are coalesced behind a debounce so a burst of
//! transitions runs one pass. A single progression tick advances active
//! tasks while the active pool is non-empty and stops when it drains.
//! Pool changes are mirrored to the world store as fire-and-forget writes;
//! the store's own autosave makes them durable.

use crate::core::config::SchedulerConfig;
use crate::prelude::HashMap;
use crate::scheduler::pools::PoolSet;
use crate::scheduler::task::{PoolKind, Task, TaskId, TaskSpec};
use crate::store::worker::{PoolSnapshot, StoreHandle};
use crate::{GridError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// `canFit`: a task fits when the budget is positive and the free share
/// covers `cost / C`, i.e. `used + cost <= C`.
fn fits(coefficient: u32, used: u64, cost: u32) -> bool {
    coefficient > 0 && used + u64::from(cost) <= u64::from(coefficient)
}

struct State {
    pools: PoolSet,
    coefficient: u32,
    greedy_enabled: bool,
    greedy_scheduled: bool,
    admission_scheduled: bool,
    tick_running: bool,
    next_id: TaskId,
    loaded: bool,
    shutdown: bool,
    completed_tx: Sender<Task>,
}

/// Shared context cloned into the debounce, greedy and tick tasks.
#[derive(Clone)]
struct Ctx {
    state: Arc<Mutex<State>>,
    store: StoreHandle,
    config: SchedulerConfig,
}

pub struct AttentionScheduler {
    ctx: Ctx,
    completed_rx: Receiver<Task>,
}

impl AttentionScheduler {
    /// Create a scheduler bound to a store handle. The scheduler accepts
    /// no tasks until [`AttentionScheduler::load`] has refreshed the
    /// authoritative attention coefficient and pools from the store.
    pub fn new(store: StoreHandle, config: SchedulerConfig) -> Self {
        let (completed_tx, completed_rx) = unbounded();
        let state = State {
            pools: PoolSet::new(),
            coefficient: 0,
            greedy_enabled: false,
            greedy_scheduled: false,
            admission_scheduled: false,
            tick_running: false,
            next_id: 1,
            loaded: false,
            shutdown: false,
            completed_tx,
        };
        Self {
            ctx: Ctx {
                state: Arc::new(Mutex::new(state)),
                store,
                config,
            },
            completed_rx,
        }
    }

    /// Pull the persisted pools and attention coefficient from the store.
    /// Runs an initial admission pass and restarts progression for any
    /// reloaded active tasks.
    pub async fn load(&self) -> Result<()> {
        self.ctx.store.wait_ready().await?;
        let coefficient = self.ctx.store.get_attention_limit().await?;
        let snapshot = self.ctx.store.get_all_tasks().await?;

        if let Ok(mut st) = self.ctx.state.lock() {
            st.pools = pools_from_snapshot(snapshot);
            st.coefficient = coefficient;
            st.next_id = st.pools.max_id().map(|id| id + 1).unwrap_or(1);
            st.loaded = true;
        }
        self.ctx.trigger_admission();
        Ok(())
    }

    /// Append a new task to the pending pool and trigger admission.
    pub fn add_task(&self, spec: TaskSpec) -> Result<TaskId> {
        if spec.cost < 1 {
            return Err(GridError::InvalidInput("task cost must be >= 1".into()));
        }
        if spec.duration_ms == 0 {
            return Err(GridError::InvalidInput(
                "task duration must be positive".into(),
            ));
        }

        let task = {
            let Ok(mut st) = self.ctx.state.lock() else {
                return Err(GridError::Store("scheduler state poisoned".into()));
            };
            if !st.loaded {
                return Err(GridError::Store(
                    "scheduler not loaded from store yet".into(),
                ));
            }
            let id = st.next_id;
            st.next_id += 1;
            let task = spec.into_task(id);
            st.pools.pending.push_back(task.clone());
            task
        };

        let id = task.id;
        let store = self.ctx.store.clone();
        persist("push_tasks", async move {
            store.push_tasks(vec![task]).await.map(|_| ())
        });
        self.ctx.trigger_admission();
        Ok(id)
    }

    /// Freeze an active task. Frees budget, so admission is triggered.
    pub fn pause(&self, id: TaskId) {
        let moved = self.ctx.with_state(|st| {
            if let Some(task) = st.pools.active.remove(&id) {
                st.pools.paused.insert(id, task);
                true
            } else {
                log::debug!("pause: task {} is not active", id);
                false
            }
        });
        if moved {
            let store = self.ctx.store.clone();
            persist("move_task", async move {
                store.move_task(id, PoolKind::Active, PoolKind::Paused).await
            });
            self.ctx.trigger_admission();
        }
    }

    /// Queue a paused task for readmission, ahead of all pending tasks.
    pub fn resume(&self, id: TaskId) {
        let moved = self.ctx.with_state(|st| {
            if let Some(task) = st.pools.paused.remove(&id) {
                st.pools.resumed.push_back(task);
                true
            } else {
                log::debug!("resume: task {} is not paused", id);
                false
            }
        });
        if moved {
            let store = self.ctx.store.clone();
            persist("move_task", async move {
                store.move_task(id, PoolKind::Paused, PoolKind::Resumed).await
            });
            self.ctx.trigger_admission();
        }
    }

    /// Move a task from resumed back to paused. Does not trigger
    /// admission: the task was not occupying budget.
    pub fn pause_resumed(&self, id: TaskId) {
        let moved = self.ctx.with_state(|st| {
            if let Some(pos) = st.pools.resumed.iter().position(|t| t.id == id) {
                if let Some(task) = st.pools.resumed.remove(pos) {
                    st.pools.paused.insert(id, task);
                    return true;
                }
            }
            log::debug!("pause_resumed: task {} is not resumed", id);
            false
        });
        if moved {
            let store = self.ctx.store.clone();
            persist("move_task", async move {
                store.move_task(id, PoolKind::Resumed, PoolKind::Paused).await
            });
        }
    }

    /// Remove a task from whichever pool holds it. Unknown ids are a no-op.
    pub fn cancel(&self, id: TaskId) {
        let removed = self.ctx.with_state(|st| st.pools.remove(id));
        if let Some((_, from)) = removed {
            let store = self.ctx.store.clone();
            persist("remove_task", async move {
                store.remove_task(id, from).await
            });
            if from == PoolKind::Active {
                self.ctx.trigger_admission();
            }
        } else {
            log::debug!("cancel: unknown task {}", id);
        }
    }

    /// Complete an active task: remove it, emit a completion event and
    /// free its budget share. The progression tick calls the same path
    /// when `elapsed_ms` reaches the duration.
    pub fn complete(&self, id: TaskId) {
        let completed = self.ctx.with_state(|st| {
            if let Some(task) = st.pools.active.remove(&id) {
                let _ = st.completed_tx.send(task.clone());
                Some(task)
            } else {
                None
            }
        });
        if completed.is_some() {
            let store = self.ctx.store.clone();
            persist("remove_task", async move {
                store.remove_task(id, PoolKind::Active).await
            });
            self.ctx.trigger_admission();
        }
    }

    /// Search all pools for a task.
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.ctx.with_state(|st| st.pools.get(id).cloned())
    }

    /// Which pool currently holds the task.
    pub fn pool_of(&self, id: TaskId) -> Option<PoolKind> {
        self.ctx.with_state(|st| st.pools.pool_of(id))
    }

    /// Set the capacity denominator. Raising it may admit waiting tasks.
    pub fn set_attention_coefficient(&self, coefficient: i64) -> Result<()> {
        if coefficient < 0 {
            return Err(GridError::InvalidInput(
                "attention coefficient must be non-negative".into(),
            ));
        }
        let coefficient = coefficient as u32;
        let raised = self.ctx.with_state(|st| {
            let raised = coefficient > st.coefficient;
            st.coefficient = coefficient;
            raised
        });
        let store = self.ctx.store.clone();
        persist("set_attention_limit", async move {
            store.set_attention_limit(coefficient).await
        });
        if raised {
            self.ctx.trigger_admission();
        }
        Ok(())
    }

    pub fn set_greedy_enabled(&self, enabled: bool) {
        self.ctx.with_state(|st| st.greedy_enabled = enabled);
    }

    /// `Σ cost / C` over the active pool, `0` when `C == 0`.
    pub fn used_attention(&self) -> f64 {
        self.ctx.with_state(|st| {
            if st.coefficient == 0 {
                0.0
            } else {
                st.pools.used_cost() as f64 / f64::from(st.coefficient)
            }
        })
    }

    pub fn free_attention(&self) -> f64 {
        1.0 - self.used_attention()
    }

    /// Drain completion events without blocking.
    pub fn try_recv_completed(&self) -> Vec<Task> {
        let mut completed = Vec::new();
        while let Ok(task) = self.completed_rx.try_recv() {
            completed.push(task);
        }
        completed
    }

    /// Stop the debounce, greedy and progression tasks at their next
    /// wakeup. Safe to call multiple times.
    pub fn shutdown(&self) {
        self.ctx.with_state(|st| st.shutdown = true);
    }
}

impl Ctx {
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R
    where
        R: Default,
    {
        match self.state.lock() {
            Ok(mut st) => f(&mut st),
            Err(_) => R::default(),
        }
    }

    /// Schedule a debounced admission pass; triggers arriving while one is
    /// scheduled coalesce into it.
    fn trigger_admission(&self) {
        let should_spawn = self.with_state(|st| {
            if st.shutdown || st.admission_scheduled {
                false
            } else {
                st.admission_scheduled = true;
                true
            }
        });
        if should_spawn {
            let ctx = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ctx.config.admission_debounce).await;
                ctx.run_admission();
            });
        }
    }

    /// The sequential admission pass: drain fitting resumed heads first,
    /// then pending heads only once resumed is empty. A head that does not
    /// fit blocks everything behind it; that is what greedy is for.
    fn run_admission(&self) {
        let mut admitted: Vec<TaskId> = Vec::new();
        let mut from_pools: Vec<PoolKind> = Vec::new();
        let mut want_greedy = false;
        let mut start_tick = false;

        let ok = self.with_state(|st| {
            st.admission_scheduled = false;
            if st.shutdown {
                return false;
            }
            let coefficient = st.coefficient;
            let mut used = st.pools.used_cost();

            while let Some(head) = st.pools.resumed.front() {
                if !fits(coefficient, used, head.cost) {
                    break;
                }
                if let Some(task) = st.pools.resumed.pop_front() {
                    used += u64::from(task.cost);
                    admitted.push(task.id);
                    from_pools.push(PoolKind::Resumed);
                    st.pools.active.insert(task.id, task);
                }
            }
            if st.pools.resumed.is_empty() {
                while let Some(head) = st.pools.pending.front() {
                    if !fits(coefficient, used, head.cost) {
                        break;
                    }
                    if let Some(task) = st.pools.pending.pop_front() {
                        used += u64::from(task.cost);
                        admitted.push(task.id);
                        from_pools.push(PoolKind::Pending);
                        st.pools.active.insert(task.id, task);
                    }
                }
            }

            if let Some(head) = st.pools.queue_head() {
                if !fits(coefficient, used, head.cost)
                    && st.greedy_enabled
                    && !st.greedy_scheduled
                {
                    st.greedy_scheduled = true;
                    want_greedy = true;
                }
            }

            if !st.pools.active.is_empty() && !st.tick_running {
                st.tick_running = true;
                start_tick = true;
            }
            true
        });
        if !ok {
            return;
        }

        if !admitted.is_empty() {
            log::debug!("admitted {} task(s)", admitted.len());
        }
        for (id, from) in admitted.into_iter().zip(from_pools) {
            let store = self.store.clone();
            persist("move_task", async move {
                store.move_task(id, from, PoolKind::Active).await
            });
        }
        if want_greedy {
            let ctx = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ctx.config.greedy_delay).await;
                ctx.run_greedy();
            });
        }
        if start_tick {
            self.spawn_tick();
        }
    }

    /// The greedy backfill pass: walk resumed then pending in order and
    /// admit whatever fits, skipping larger tasks. Runs once per schedule;
    /// the delay is runtime-only and never persisted.
    fn run_greedy(&self) {
        let mut admitted: Vec<(TaskId, PoolKind)> = Vec::new();
        let mut start_tick = false;

        self.with_state(|st| {
            st.greedy_scheduled = false;
            if st.shutdown || !st.greedy_enabled {
                return;
            }
            let coefficient = st.coefficient;
            let mut used = st.pools.used_cost();

            for pool in [PoolKind::Resumed, PoolKind::Pending] {
                let mut queue = match pool {
                    PoolKind::Resumed => std::mem::take(&mut st.pools.resumed),
                    _ => std::mem::take(&mut st.pools.pending),
                };
                let mut kept = std::collections::VecDeque::with_capacity(queue.len());
                while let Some(task) = queue.pop_front() {
                    if fits(coefficient, used, task.cost) {
                        used += u64::from(task.cost);
                        admitted.push((task.id, pool));
                        st.pools.active.insert(task.id, task);
                    } else {
                        kept.push_back(task);
                    }
                }
                match pool {
                    PoolKind::Resumed => st.pools.resumed = kept,
                    _ => st.pools.pending = kept,
                }
            }

            if !st.pools.active.is_empty() && !st.tick_running {
                st.tick_running = true;
                start_tick = true;
            }
        });

        if !admitted.is_empty() {
            log::debug!("greedy pass admitted {} task(s)", admitted.len());
        }
        for (id, from) in admitted {
            let store = self.store.clone();
            persist("move_task", async move {
                store.move_task(id, from, PoolKind::Active).await
            });
        }
        if start_tick {
            self.spawn_tick();
        }
    }

    fn spawn_tick(&self) {
        let ctx = self.clone();
        tokio::spawn(async move {
            let mut last = Instant::now();
            loop {
                tokio::time::sleep(ctx.config.progress_tick).await;
                let now = Instant::now();
                let delta_ms = now.duration_since(last).as_millis() as u64;
                last = now;

                let mut completed: Vec<Task> = Vec::new();
                let mut progress: Vec<(TaskId, u64)> = Vec::new();
                let mut stop = false;

                let alive = ctx.with_state(|st| {
                    if st.shutdown {
                        st.tick_running = false;
                        return false;
                    }
                    let ids: Vec<TaskId> = st.pools.active.keys().copied().collect();
                    let mut done: Vec<TaskId> = Vec::new();
                    for id in ids {
                        if let Some(task) = st.pools.active.get_mut(&id) {
                            task.elapsed_ms =
                                (task.elapsed_ms + delta_ms).min(task.duration_ms);
                            if task.is_complete() {
                                done.push(id);
                            } else {
                                progress.push((id, task.elapsed_ms));
                            }
                        }
                    }
                    for id in done {
                        if let Some(task) = st.pools.active.remove(&id) {
                            let _ = st.completed_tx.send(task.clone());
                            completed.push(task);
                        }
                    }
                    if st.pools.active.is_empty() {
                        st.tick_running = false;
                        stop = true;
                    }
                    true
                });
                if !alive {
                    return;
                }

                for task in &completed {
                    let store = ctx.store.clone();
                    let id = task.id;
                    persist("remove_task", async move {
                        store.remove_task(id, PoolKind::Active).await
                    });
                }
                if !progress.is_empty() {
                    let store = ctx.store.clone();
                    persist("update_active_progress", async move {
                        store.update_active_progress(progress).await
                    });
                }
                if !completed.is_empty() {
                    log::debug!("{} task(s) completed", completed.len());
                    ctx.trigger_admission();
                }
                if stop {
                    return;
                }
            }
        });
    }
}

fn pools_from_snapshot(snapshot: PoolSnapshot) -> PoolSet {
    let mut pools = PoolSet::new();
    pools.active = snapshot
        .active
        .into_iter()
        .map(|t| (t.id, t))
        .collect::<HashMap<_, _>>();
    pools.resumed = snapshot.resumed.into();
    pools.pending = snapshot.pending.into();
    pools.paused = snapshot
        .paused
        .into_iter()
        .map(|t| (t.id, t))
        .collect::<HashMap<_, _>>();
    pools
}

/// Mirror a pool change to the store without blocking the caller. The
/// store keeps its own dirty flags, so a failed write is retried by the
/// next autosave of the same category.
fn persist<F, T>(label: &'static str, fut: F)
where
    F: std::future::Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            log::debug!("store write ({}) failed: {}", label, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_budget_arithmetic() {
        // C = 0 admits nothing, not even cost 1
        assert!(!fits(0, 0, 1));
        // Exactly filling the budget is allowed
        assert!(fits(8, 4, 4));
        assert!(!fits(8, 4, 5));
        // cost > C never fits on an empty budget
        assert!(!fits(4, 0, 5));
    }
}
