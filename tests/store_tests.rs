//! Persistence round-trips through real files, flush semantics under
//! injected failures, and schema upgrade behavior.

use gridforge::core::config::{SchedulerConfig, StoreConfig};
use gridforge::prelude::*;
use gridforge::store::backend::collections;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

#[tokio::test]
async fn tiles_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.db");

    let store = WorldStore::open_file(&path, StoreConfig::for_testing()).unwrap();
    store.wait_ready().await.unwrap();
    store.set_tile(None, WorldCoord::new(7, -3), 11).await.unwrap();
    store.set_tile(Some(2), WorldCoord::new(0, 0), 5).await.unwrap();
    store.set_current_level_index(2).await.unwrap();
    store.flush().await.unwrap();
    store.shutdown().await.unwrap();

    let store = WorldStore::open_file(&path, StoreConfig::for_testing()).unwrap();
    store.wait_ready().await.unwrap();
    assert_eq!(
        store.get_tile(Some(0), WorldCoord::new(7, -3)).await.unwrap(),
        Some(11)
    );
    assert_eq!(store.get_current_level_index().await.unwrap(), 2);
    // Level 2 is the current level after reopen.
    assert_eq!(
        store.get_tile(None, WorldCoord::new(0, 0)).await.unwrap(),
        Some(5)
    );
    assert_eq!(store.get_tiles_count_in_level(Some(2)).await.unwrap(), 1);
}

#[tokio::test]
async fn erased_level_is_deleted_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.db");

    let store = WorldStore::open_file(&path, StoreConfig::for_testing()).unwrap();
    store.wait_ready().await.unwrap();
    store.set_tile(None, WorldCoord::new(1, 1), 9).await.unwrap();
    store.flush().await.unwrap();
    // Erasing the only tile empties the level; the flush must delete the
    // level object rather than write an empty one.
    store
        .set_tile(None, WorldCoord::new(1, 1), EMPTY_TILE)
        .await
        .unwrap();
    store.flush().await.unwrap();
    store.shutdown().await.unwrap();

    let backend = FileStore::open(&path).unwrap();
    assert_eq!(backend.keys(collections::LEVELS).unwrap().len(), 0);
    // No task has ever existed, so no pool object was written either.
    assert_eq!(backend.keys(collections::TASKS).unwrap().len(), 0);
}

#[tokio::test]
async fn tasks_survive_reopen_in_their_pools() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.db");

    let id_active;
    let id_paused;
    let id_pending;
    {
        let store = WorldStore::open_file(&path, StoreConfig::for_testing()).unwrap();
        let sched = AttentionScheduler::new(store.clone(), SchedulerConfig::for_testing());
        sched.load().await.unwrap();
        sched.set_attention_coefficient(8).unwrap();

        id_active = sched
            .add_task(TaskSpec::new("dig", 2, 600_000).with_payload(json!({"depth": 4})))
            .unwrap();
        id_paused = sched.add_task(TaskSpec::new("haul", 1, 600_000)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        sched.pause(id_paused);

        // Leave one task waiting: drop the budget so it cannot enter.
        sched.set_attention_coefficient(2).unwrap();
        id_pending = sched.add_task(TaskSpec::new("build", 4, 600_000)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        sched.shutdown();
        store.flush().await.unwrap();
        store.shutdown().await.unwrap();
    }

    let store = WorldStore::open_file(&path, StoreConfig::for_testing()).unwrap();
    let sched = AttentionScheduler::new(store.clone(), SchedulerConfig::for_testing());
    sched.load().await.unwrap();

    assert_eq!(sched.pool_of(id_active), Some(PoolKind::Active));
    assert_eq!(sched.pool_of(id_paused), Some(PoolKind::Paused));
    assert_eq!(sched.pool_of(id_pending), Some(PoolKind::Pending));

    let reloaded = sched.get(id_active).unwrap();
    assert_eq!(reloaded.kind, "dig");
    assert_eq!(reloaded.payload, json!({"depth": 4}));

    // The persisted coefficient is authoritative after reload.
    assert!((sched.used_attention() - 1.0).abs() < 1e-9);

    // Fresh ids never collide with persisted ones.
    let fresh = sched.add_task(TaskSpec::new("new", 1, 1000)).unwrap();
    assert!(fresh > id_pending);

    sched.shutdown();
    store.shutdown().await.unwrap();
}

/// An object store whose next commit can be made to fail, for probing
/// flush error surfacing and dirty-flag retry.
struct FlakyStore {
    inner: MemoryStore,
    fail: Arc<AtomicBool>,
}

impl ObjectStore for FlakyStore {
    fn collection_names(&self) -> Vec<String> {
        self.inner.collection_names()
    }
    fn create_collection(&mut self, name: &str) -> gridforge::Result<()> {
        self.inner.create_collection(name)
    }
    fn drop_collection(&mut self, name: &str) -> gridforge::Result<()> {
        self.inner.drop_collection(name)
    }
    fn get(&self, collection: &str, key: &str) -> gridforge::Result<Option<Vec<u8>>> {
        self.inner.get(collection, key)
    }
    fn keys(&self, collection: &str) -> gridforge::Result<Vec<String>> {
        self.inner.keys(collection)
    }
    fn commit(&mut self, ops: Vec<WriteOp>) -> gridforge::Result<()> {
        if !ops.is_empty() && self.fail.swap(false, Ordering::SeqCst) {
            return Err(gridforge::Error::Store("disk on fire".into()));
        }
        self.inner.commit(ops)
    }
}

#[tokio::test]
async fn flush_surfaces_failure_and_retries() {
    let fail = Arc::new(AtomicBool::new(false));
    let backend = FlakyStore {
        inner: MemoryStore::new(),
        fail: fail.clone(),
    };
    let store = WorldStore::spawn(Box::new(backend), StoreConfig::for_testing());
    store.wait_ready().await.unwrap();

    store.set_tile(None, WorldCoord::new(3, 3), 6).await.unwrap();
    fail.store(true, Ordering::SeqCst);
    assert!(store.flush().await.is_err());

    // The category stayed dirty, so the next flush persists it.
    assert!(store.stats().await.unwrap().dirty_categories > 0);
    store.flush().await.unwrap();
    assert_eq!(store.stats().await.unwrap().dirty_categories, 0);
}

#[tokio::test]
async fn newer_schema_fails_wait_ready() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.db");

    {
        let mut backend = FileStore::open(&path).unwrap();
        backend.create_collection(collections::SCHEMA).unwrap();
        let version = bincode::serialize(&99u32).unwrap();
        backend
            .commit(vec![WriteOp::put(collections::SCHEMA, "version", version)])
            .unwrap();
    }

    let store = WorldStore::open_file(&path, StoreConfig::for_testing()).unwrap();
    let err = store.wait_ready().await.unwrap_err();
    assert!(matches!(err, gridforge::Error::Schema(_)));

    // Every later request reports the same startup failure.
    assert!(store.get_tile(None, WorldCoord::new(0, 0)).await.is_err());
}
