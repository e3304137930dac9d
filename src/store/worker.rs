//! The persistent world store worker.
//!
//! A single spawned task owns every piece of persisted state: the sparse
//! per-level tile maps, the editor meta state, the attention limit and the
//! four task pools. Callers talk to it exclusively through [`StoreHandle`],
//! whose methods send a request and await a one-shot reply, so nothing
//! mutable is ever shared across the boundary.
//!
//! Writes set per-category dirty flags; a trailing-throttle autosave
//! commits all dirty categories in one atomic transaction. `flush` cancels
//! the throttle and commits immediately.

use crate::core::{
    config::StoreConfig,
    grid::{TileGrid, TileIndex, WorldCoord},
};
use crate::prelude::{HashMap, HashSet};
use crate::scheduler::task::{PoolKind, Task, TaskId};
use crate::store::backend::{self, collections, ObjectStore, WriteOp};
use crate::store::world::{LevelObject, WorldMap};
use crate::{GridError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct MetaState {
    current_level_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct AttentionState {
    attention_limit: u32,
}

/// Persisted shape of one pool: `tasks[pool] = { tasks: [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TasksObject {
    tasks: Vec<Task>,
}

/// All four task pools as persisted, in stored order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSnapshot {
    pub active: Vec<Task>,
    pub resumed: Vec<Task>,
    pub pending: Vec<Task>,
    pub paused: Vec<Task>,
}

impl PoolSnapshot {
    fn list(&self, pool: PoolKind) -> &Vec<Task> {
        match pool {
            PoolKind::Active => &self.active,
            PoolKind::Resumed => &self.resumed,
            PoolKind::Pending => &self.pending,
            PoolKind::Paused => &self.paused,
        }
    }

    fn list_mut(&mut self, pool: PoolKind) -> &mut Vec<Task> {
        match pool {
            PoolKind::Active => &mut self.active,
            PoolKind::Resumed => &mut self.resumed,
            PoolKind::Pending => &mut self.pending,
            PoolKind::Paused => &mut self.paused,
        }
    }
}

/// Read-only snapshot of worker internals for the editor's debug overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub levels_loaded: usize,
    pub dirty_categories: usize,
    pub autosave_pending: bool,
}

/// Which persisted categories hold unsaved edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DirtyKey {
    Level(u32),
    Meta,
    Attention,
    Pool(PoolKind),
}

enum StoreRequest {
    WaitReady {
        reply: oneshot::Sender<Result<()>>,
    },
    TileWindow {
        level: Option<u32>,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
        reply: oneshot::Sender<Result<TileGrid>>,
    },
    GetTile {
        level: Option<u32>,
        coord: WorldCoord,
        reply: oneshot::Sender<Result<Option<TileIndex>>>,
    },
    SetTile {
        level: Option<u32>,
        coord: WorldCoord,
        index: TileIndex,
        reply: oneshot::Sender<Result<()>>,
    },
    SetTiles {
        level: Option<u32>,
        tiles: Vec<(WorldCoord, TileIndex)>,
        reply: oneshot::Sender<Result<()>>,
    },
    CurrentLevel {
        reply: oneshot::Sender<Result<u32>>,
    },
    SetCurrentLevel {
        level: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    TileCount {
        level: Option<u32>,
        reply: oneshot::Sender<Result<usize>>,
    },
    AllTasks {
        reply: oneshot::Sender<Result<PoolSnapshot>>,
    },
    MoveTask {
        id: TaskId,
        from: PoolKind,
        to: PoolKind,
        reply: oneshot::Sender<Result<()>>,
    },
    PushTasks {
        tasks: Vec<Task>,
        reply: oneshot::Sender<Result<Vec<TaskId>>>,
    },
    RemoveTask {
        id: TaskId,
        from: PoolKind,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateActiveProgress {
        entries: Vec<(TaskId, u64)>,
        reply: oneshot::Sender<Result<()>>,
    },
    AttentionLimit {
        reply: oneshot::Sender<Result<u32>>,
    },
    SetAttentionLimit {
        limit: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<Result<StoreStats>>,
    },
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Entry points for spawning a store worker.
pub struct WorldStore;

impl WorldStore {
    /// Spawn a worker over an already-opened backend.
    pub fn spawn(backend: Box<dyn ObjectStore>, config: StoreConfig) -> StoreHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            Worker::new(backend, config, rx).run().await;
        });
        StoreHandle { tx }
    }

    /// Spawn a worker over a volatile in-memory backend.
    pub fn in_memory(config: StoreConfig) -> StoreHandle {
        Self::spawn(Box::new(backend::MemoryStore::new()), config)
    }

    /// Open (or create) a file database and spawn a worker over it.
    pub fn open_file(path: impl AsRef<std::path::Path>, config: StoreConfig) -> Result<StoreHandle> {
        let backend = backend::FileStore::open(path)?;
        Ok(Self::spawn(Box::new(backend), config))
    }
}

/// Cloneable client of the store worker. All methods are request/response;
/// dropping every handle shuts the worker down after a final commit.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreRequest>,
}

impl StoreHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreRequest,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| GridError::StoreClosed)?;
        rx.await.map_err(|_| GridError::StoreClosed)?
    }

    /// Resolves once the worker has loaded its persisted state; surfaces a
    /// schema upgrade failure.
    pub async fn wait_ready(&self) -> Result<()> {
        self.request(|reply| StoreRequest::WaitReady { reply }).await
    }

    /// Read a rectangular window of tiles by world coordinates.
    pub async fn tile_window(
        &self,
        level: Option<u32>,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<TileGrid> {
        self.request(|reply| StoreRequest::TileWindow {
            level,
            width,
            height,
            offset_x,
            offset_y,
            reply,
        })
        .await
    }

    pub async fn get_tile(&self, level: Option<u32>, coord: WorldCoord) -> Result<Option<TileIndex>> {
        self.request(|reply| StoreRequest::GetTile { level, coord, reply })
            .await
    }

    pub async fn set_tile(
        &self,
        level: Option<u32>,
        coord: WorldCoord,
        index: TileIndex,
    ) -> Result<()> {
        self.request(|reply| StoreRequest::SetTile {
            level,
            coord,
            index,
            reply,
        })
        .await
    }

    pub async fn set_tiles(
        &self,
        level: Option<u32>,
        tiles: Vec<(WorldCoord, TileIndex)>,
    ) -> Result<()> {
        self.request(|reply| StoreRequest::SetTiles { level, tiles, reply })
            .await
    }

    /// Fill a rectangle of cells with one tile index in a single batch.
    pub async fn fill_rect(
        &self,
        level: Option<u32>,
        origin: WorldCoord,
        width: u32,
        height: u32,
        index: TileIndex,
    ) -> Result<()> {
        let mut tiles = Vec::with_capacity((width * height) as usize);
        for dy in 0..height {
            for dx in 0..width {
                tiles.push((origin.offset(dx as i32, dy as i32), index));
            }
        }
        self.set_tiles(level, tiles).await
    }

    pub async fn get_current_level_index(&self) -> Result<u32> {
        self.request(|reply| StoreRequest::CurrentLevel { reply }).await
    }

    pub async fn set_current_level_index(&self, level: u32) -> Result<()> {
        self.request(|reply| StoreRequest::SetCurrentLevel { level, reply })
            .await
    }

    pub async fn get_tiles_count_in_level(&self, level: Option<u32>) -> Result<usize> {
        self.request(|reply| StoreRequest::TileCount { level, reply })
            .await
    }

    pub async fn get_all_tasks(&self) -> Result<PoolSnapshot> {
        self.request(|reply| StoreRequest::AllTasks { reply }).await
    }

    pub async fn move_task(&self, id: TaskId, from: PoolKind, to: PoolKind) -> Result<()> {
        self.request(|reply| StoreRequest::MoveTask { id, from, to, reply })
            .await
    }

    /// Append tasks to the pending pool; echoes their ids back.
    pub async fn push_tasks(&self, tasks: Vec<Task>) -> Result<Vec<TaskId>> {
        self.request(|reply| StoreRequest::PushTasks { tasks, reply })
            .await
    }

    pub async fn remove_task(&self, id: TaskId, from: PoolKind) -> Result<()> {
        self.request(|reply| StoreRequest::RemoveTask { id, from, reply })
            .await
    }

    pub async fn update_active_progress(&self, entries: Vec<(TaskId, u64)>) -> Result<()> {
        self.request(|reply| StoreRequest::UpdateActiveProgress { entries, reply })
            .await
    }

    pub async fn get_attention_limit(&self) -> Result<u32> {
        self.request(|reply| StoreRequest::AttentionLimit { reply })
            .await
    }

    pub async fn set_attention_limit(&self, limit: u32) -> Result<()> {
        self.request(|reply| StoreRequest::SetAttentionLimit { limit, reply })
            .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.request(|reply| StoreRequest::Stats { reply }).await
    }

    /// Cancel the autosave throttle and persist every dirty category now.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| StoreRequest::Flush { reply }).await
    }

    /// Flush and stop the worker. Subsequent requests fail with
    /// [`GridError::StoreClosed`].
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| StoreRequest::Shutdown { reply }).await
    }
}

struct Worker {
    backend: Box<dyn ObjectStore>,
    config: StoreConfig,
    rx: mpsc::UnboundedReceiver<StoreRequest>,
    levels: HashMap<u32, WorldMap>,
    current_level: u32,
    attention_limit: u32,
    pools: PoolSnapshot,
    dirty: HashSet<DirtyKey>,
    autosave_deadline: Option<Instant>,
}

impl Worker {
    fn new(
        backend: Box<dyn ObjectStore>,
        config: StoreConfig,
        rx: mpsc::UnboundedReceiver<StoreRequest>,
    ) -> Self {
        Self {
            backend,
            config,
            rx,
            levels: HashMap::default(),
            current_level: 0,
            attention_limit: 0,
            pools: PoolSnapshot::default(),
            dirty: HashSet::default(),
            autosave_deadline: None,
        }
    }

    async fn run(mut self) {
        if let Err(e) = self.open() {
            log::error!("world store failed to open: {}", e);
            let message = e.to_string();
            // Stay alive so every caller learns about the failure instead
            // of seeing a dead channel.
            while let Some(request) = self.rx.recv().await {
                Self::reject(request, &message);
            }
            return;
        }
        log::debug!(
            "world store ready: {} level(s), current level {}",
            self.levels.len(),
            self.current_level
        );

        loop {
            let deadline = self.autosave_deadline;
            tokio::select! {
                maybe = self.rx.recv() => {
                    match maybe {
                        Some(request) => {
                            if self.handle(request) {
                                break;
                            }
                        }
                        None => {
                            // Every handle dropped: final commit, then exit.
                            if let Err(e) = self.commit_dirty() {
                                log::warn!("final autosave failed: {}", e);
                            }
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.autosave_deadline = None;
                    if let Err(e) = self.commit_dirty() {
                        log::warn!("autosave failed, will retry: {}", e);
                        self.autosave_deadline = Some(Instant::now() + self.config.autosave_interval);
                    }
                }
            }
        }
    }

    fn open(&mut self) -> Result<()> {
        backend::upgrade_schema(self.backend.as_mut())?;

        for key in self.backend.keys(collections::LEVELS)? {
            let Ok(level) = key.parse::<u32>() else {
                log::debug!("skipping malformed level key {:?}", key);
                continue;
            };
            if let Some(bytes) = self.backend.get(collections::LEVELS, &key)? {
                let object: LevelObject = bincode::deserialize(&bytes)?;
                self.levels.insert(level, WorldMap::from_records(object));
            }
        }

        if let Some(bytes) = self.backend.get(collections::META, "state")? {
            let meta: MetaState = bincode::deserialize(&bytes)?;
            self.current_level = meta.current_level_index;
        }

        if let Some(bytes) = self.backend.get(collections::DUNGEON_STATE, "attention")? {
            let attention: AttentionState = bincode::deserialize(&bytes)?;
            self.attention_limit = attention.attention_limit;
        }

        for pool in PoolKind::ALL {
            if let Some(bytes) = self.backend.get(collections::TASKS, pool.as_str())? {
                let object: TasksObject = bincode::deserialize(&bytes)?;
                *self.pools.list_mut(pool) = object.tasks;
            }
        }
        Ok(())
    }

    /// Returns true when the worker should stop.
    fn handle(&mut self, request: StoreRequest) -> bool {
        match request {
            StoreRequest::WaitReady { reply } => {
                let _ = reply.send(Ok(()));
            }
            StoreRequest::TileWindow {
                level,
                width,
                height,
                offset_x,
                offset_y,
                reply,
            } => {
                let level = self.resolve(level);
                let grid = match self.levels.get(&level) {
                    Some(map) => map.window(width, height, offset_x, offset_y),
                    None => TileGrid::empty(width, height),
                };
                let _ = reply.send(Ok(grid));
            }
            StoreRequest::GetTile { level, coord, reply } => {
                let level = self.resolve(level);
                let index = self.levels.get(&level).and_then(|map| map.get(coord));
                let _ = reply.send(Ok(index));
            }
            StoreRequest::SetTile {
                level,
                coord,
                index,
                reply,
            } => {
                let level = self.resolve(level);
                self.levels.entry(level).or_default().set(coord, index);
                self.mark_dirty(DirtyKey::Level(level));
                let _ = reply.send(Ok(()));
            }
            StoreRequest::SetTiles { level, tiles, reply } => {
                let level = self.resolve(level);
                let map = self.levels.entry(level).or_default();
                for (coord, index) in tiles {
                    map.set(coord, index);
                }
                self.mark_dirty(DirtyKey::Level(level));
                let _ = reply.send(Ok(()));
            }
            StoreRequest::CurrentLevel { reply } => {
                let _ = reply.send(Ok(self.current_level));
            }
            StoreRequest::SetCurrentLevel { level, reply } => {
                if level != self.current_level {
                    self.current_level = level;
                    self.mark_dirty(DirtyKey::Meta);
                }
                let _ = reply.send(Ok(()));
            }
            StoreRequest::TileCount { level, reply } => {
                let level = self.resolve(level);
                let count = self.levels.get(&level).map(WorldMap::len).unwrap_or(0);
                let _ = reply.send(Ok(count));
            }
            StoreRequest::AllTasks { reply } => {
                let _ = reply.send(Ok(self.pools.clone()));
            }
            StoreRequest::MoveTask { id, from, to, reply } => {
                let source = self.pools.list_mut(from);
                match source.iter().position(|t| t.id == id) {
                    Some(pos) => {
                        let task = source.remove(pos);
                        self.pools.list_mut(to).push(task);
                        self.mark_dirty(DirtyKey::Pool(from));
                        self.mark_dirty(DirtyKey::Pool(to));
                    }
                    None => {
                        log::debug!("move_task: {} not in {}", id, from);
                    }
                }
                let _ = reply.send(Ok(()));
            }
            StoreRequest::PushTasks { tasks, reply } => {
                let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
                if !tasks.is_empty() {
                    self.pools.pending.extend(tasks);
                    self.mark_dirty(DirtyKey::Pool(PoolKind::Pending));
                }
                let _ = reply.send(Ok(ids));
            }
            StoreRequest::RemoveTask { id, from, reply } => {
                let source = self.pools.list_mut(from);
                match source.iter().position(|t| t.id == id) {
                    Some(pos) => {
                        source.remove(pos);
                        self.mark_dirty(DirtyKey::Pool(from));
                    }
                    None => {
                        log::debug!("remove_task: {} not in {}", id, from);
                    }
                }
                let _ = reply.send(Ok(()));
            }
            StoreRequest::UpdateActiveProgress { entries, reply } => {
                let mut touched = false;
                for (id, elapsed_ms) in entries {
                    if let Some(task) = self.pools.active.iter_mut().find(|t| t.id == id) {
                        task.elapsed_ms = elapsed_ms.min(task.duration_ms);
                        touched = true;
                    }
                }
                if touched {
                    self.mark_dirty(DirtyKey::Pool(PoolKind::Active));
                }
                let _ = reply.send(Ok(()));
            }
            StoreRequest::AttentionLimit { reply } => {
                let _ = reply.send(Ok(self.attention_limit));
            }
            StoreRequest::SetAttentionLimit { limit, reply } => {
                if limit != self.attention_limit {
                    self.attention_limit = limit;
                    self.mark_dirty(DirtyKey::Attention);
                }
                let _ = reply.send(Ok(()));
            }
            StoreRequest::Stats { reply } => {
                let _ = reply.send(Ok(StoreStats {
                    levels_loaded: self.levels.len(),
                    dirty_categories: self.dirty.len(),
                    autosave_pending: self.autosave_deadline.is_some(),
                }));
            }
            StoreRequest::Flush { reply } => {
                self.autosave_deadline = None;
                let result = self.commit_dirty();
                if result.is_err() && !self.dirty.is_empty() {
                    // Keep retrying on the autosave cadence.
                    self.autosave_deadline =
                        Some(Instant::now() + self.config.autosave_interval);
                }
                let _ = reply.send(result);
            }
            StoreRequest::Shutdown { reply } => {
                self.autosave_deadline = None;
                let _ = reply.send(self.commit_dirty());
                return true;
            }
        }
        false
    }

    fn resolve(&self, level: Option<u32>) -> u32 {
        level.unwrap_or(self.current_level)
    }

    fn mark_dirty(&mut self, key: DirtyKey) {
        self.dirty.insert(key);
        if self.autosave_deadline.is_none() {
            self.autosave_deadline = Some(Instant::now() + self.config.autosave_interval);
        }
    }

    /// Persist every dirty category in one transaction. Dirty flags survive
    /// a failed commit so the next autosave retries.
    fn commit_dirty(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }

        let mut ops = Vec::with_capacity(self.dirty.len());
        for key in &self.dirty {
            match *key {
                DirtyKey::Level(level) => {
                    let name = level.to_string();
                    match self.levels.get(&level) {
                        Some(map) if !map.is_empty() => {
                            let bytes = bincode::serialize(&map.to_records())?;
                            ops.push(WriteOp::put(collections::LEVELS, name, bytes));
                        }
                        // Empty levels are deleted, not stored empty.
                        _ => ops.push(WriteOp::delete(collections::LEVELS, name)),
                    }
                }
                DirtyKey::Meta => {
                    let bytes = bincode::serialize(&MetaState {
                        current_level_index: self.current_level,
                    })?;
                    ops.push(WriteOp::put(collections::META, "state", bytes));
                }
                DirtyKey::Attention => {
                    let bytes = bincode::serialize(&AttentionState {
                        attention_limit: self.attention_limit,
                    })?;
                    ops.push(WriteOp::put(collections::DUNGEON_STATE, "attention", bytes));
                }
                DirtyKey::Pool(pool) => {
                    let list = self.pools.list(pool);
                    if list.is_empty() {
                        ops.push(WriteOp::delete(collections::TASKS, pool.as_str()));
                    } else {
                        let bytes = bincode::serialize(&TasksObject {
                            tasks: list.clone(),
                        })?;
                        ops.push(WriteOp::put(collections::TASKS, pool.as_str(), bytes));
                    }
                }
            }
        }

        self.backend.commit(ops)?;
        self.dirty.clear();
        Ok(())
    }

    fn reject(request: StoreRequest, message: &str) {
        let err = || GridError::Schema(message.to_string());
        match request {
            StoreRequest::WaitReady { reply } => drop(reply.send(Err(err()))),
            StoreRequest::TileWindow { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::GetTile { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::SetTile { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::SetTiles { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::CurrentLevel { reply } => drop(reply.send(Err(err()))),
            StoreRequest::SetCurrentLevel { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::TileCount { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::AllTasks { reply } => drop(reply.send(Err(err()))),
            StoreRequest::MoveTask { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::PushTasks { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::RemoveTask { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::UpdateActiveProgress { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::AttentionLimit { reply } => drop(reply.send(Err(err()))),
            StoreRequest::SetAttentionLimit { reply, .. } => drop(reply.send(Err(err()))),
            StoreRequest::Stats { reply } => drop(reply.send(Err(err()))),
            StoreRequest::Flush { reply } => drop(reply.send(Err(err()))),
            StoreRequest::Shutdown { reply } => drop(reply.send(Err(err()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::EMPTY_TILE;

    fn test_store() -> StoreHandle {
        WorldStore::in_memory(StoreConfig::for_testing())
    }

    #[tokio::test]
    async fn test_point_and_window_reads_agree() {
        let store = test_store();
        store.wait_ready().await.unwrap();

        store
            .set_tiles(
                None,
                vec![
                    (WorldCoord::new(0, 0), 1),
                    (WorldCoord::new(1, 0), 2),
                    (WorldCoord::new(-1, -1), 3),
                ],
            )
            .await
            .unwrap();

        let grid = store.tile_window(None, 4, 4, -2, -2).await.unwrap();
        for y in 0..4u32 {
            for x in 0..4u32 {
                let coord = WorldCoord::new(-2 + x as i32, -2 + y as i32);
                let point = store
                    .get_tile(None, coord)
                    .await
                    .unwrap()
                    .unwrap_or(EMPTY_TILE);
                assert_eq!(grid.get(x, y), point);
            }
        }
    }

    #[tokio::test]
    async fn test_levels_are_independent() {
        let store = test_store();
        store.wait_ready().await.unwrap();

        store
            .set_tile(Some(0), WorldCoord::new(5, 5), 1)
            .await
            .unwrap();
        store
            .set_tile(Some(1), WorldCoord::new(5, 5), 2)
            .await
            .unwrap();

        assert_eq!(
            store.get_tile(Some(0), WorldCoord::new(5, 5)).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.get_tile(Some(1), WorldCoord::new(5, 5)).await.unwrap(),
            Some(2)
        );
        assert_eq!(store.get_tiles_count_in_level(Some(0)).await.unwrap(), 1);

        store.set_current_level_index(1).await.unwrap();
        assert_eq!(
            store.get_tile(None, WorldCoord::new(5, 5)).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_flush_is_idempotent_when_quiescent() {
        let store = test_store();
        store.wait_ready().await.unwrap();

        store
            .set_tile(None, WorldCoord::new(1, 1), 4)
            .await
            .unwrap();
        store.flush().await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.dirty_categories, 0);
        assert!(!stats.autosave_pending);

        // Nothing dirty: second flush commits nothing and succeeds.
        store.flush().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_fires_after_interval() {
        let store = test_store();
        store.wait_ready().await.unwrap();

        store
            .set_tile(None, WorldCoord::new(2, 2), 7)
            .await
            .unwrap();
        assert!(store.stats().await.unwrap().autosave_pending);

        tokio::time::sleep(StoreConfig::for_testing().autosave_interval * 2).await;

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.dirty_categories, 0);
        assert!(!stats.autosave_pending);
    }
}
