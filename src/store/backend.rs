//! Object-collection storage substrate.
//!
//! The world store worker persists through this narrow interface: named
//! collections of key/value objects, written exclusively through atomic
//! multi-collection transactions. Two implementations are provided, an
//! in-memory store for tests and ephemeral sessions and a file-backed store
//! that snapshots the whole database with a temp-file-and-rename commit.

use crate::prelude::HashMap;
use crate::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current on-disk schema version. Bump together with [`upgrade_schema`].
pub const SCHEMA_VERSION: u32 = 2;

/// Collection names used by the world store.
pub mod collections {
    /// Per-level sparse tile maps, keyed by decimal level index.
    pub const LEVELS: &str = "levels";
    /// Editor meta state, key `"state"`.
    pub const META: &str = "meta";
    /// Attention state, key `"attention"`.
    pub const DUNGEON_STATE: &str = "dungeon_state";
    /// Task pools, keyed by pool name.
    pub const TASKS: &str = "tasks";
    /// Schema bookkeeping, key `"version"`.
    pub const SCHEMA: &str = "schema";

    /// Collections the current schema expects to exist.
    pub const ALL: [&str; 5] = [LEVELS, META, DUNGEON_STATE, TASKS, SCHEMA];
}

/// One write inside an atomic transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        collection: String,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        collection: String,
        key: String,
    },
}

impl WriteOp {
    pub fn put(collection: &str, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self::Put {
            collection: collection.to_string(),
            key: key.into(),
            value,
        }
    }

    pub fn delete(collection: &str, key: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.to_string(),
            key: key.into(),
        }
    }
}

/// A key/value object store organized into named collections.
///
/// All mutation goes through [`ObjectStore::commit`], which applies every
/// operation or none of them.
pub trait ObjectStore: Send {
    fn collection_names(&self) -> Vec<String>;

    fn create_collection(&mut self, name: &str) -> Result<()>;

    fn drop_collection(&mut self, name: &str) -> Result<()>;

    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>>;

    fn keys(&self, collection: &str) -> Result<Vec<String>>;

    /// Apply every operation atomically. An empty transaction is a no-op
    /// and must not touch durable storage.
    fn commit(&mut self, ops: Vec<WriteOp>) -> Result<()>;
}

type Collections = HashMap<String, HashMap<String, Vec<u8>>>;

fn apply_ops(collections: &mut Collections, ops: &[WriteOp]) -> Result<()> {
    for op in ops {
        match op {
            WriteOp::Put {
                collection,
                key,
                value,
            } => {
                let coll = collections
                    .get_mut(collection)
                    .ok_or_else(|| GridError::Store(format!("unknown collection {collection}")))?;
                coll.insert(key.clone(), value.clone());
            }
            WriteOp::Delete { collection, key } => {
                let coll = collections
                    .get_mut(collection)
                    .ok_or_else(|| GridError::Store(format!("unknown collection {collection}")))?;
                coll.remove(key);
            }
        }
    }
    Ok(())
}

/// Volatile store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Collections,
    fail_next_commit: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next non-empty commit fail without applying anything.
    /// Used by tests probing transaction atomicity and retry behavior.
    pub fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }
}

impl ObjectStore for MemoryStore {
    fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.collections.remove(name);
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|coll| coll.get(key))
            .cloned())
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self
            .collections
            .get(collection)
            .map(|coll| coll.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn commit(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if self.fail_next_commit {
            self.fail_next_commit = false;
            return Err(GridError::Store("injected commit failure".to_string()));
        }
        // Stage on a copy so a mid-transaction error leaves nothing applied.
        let mut staged = self.collections.clone();
        apply_ops(&mut staged, &ops)?;
        self.collections = staged;
        Ok(())
    }
}

/// Serialized form of the whole database file.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    collections: Collections,
}

/// File-backed store. The database is a single bincode snapshot rewritten
/// on each commit via a temp file and an atomic rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    collections: Collections,
}

impl FileStore {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let snapshot: Snapshot = bincode::deserialize(&bytes)?;
            snapshot.collections
        } else {
            Collections::default()
        };
        Ok(Self { path, collections })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, collections: &Collections) -> Result<()> {
        let bytes = bincode::serialize(&Snapshot {
            collections: collections.clone(),
        })?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ObjectStore for FileStore {
    fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.collections.remove(name);
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|coll| coll.get(key))
            .cloned())
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self
            .collections
            .get(collection)
            .map(|coll| coll.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn commit(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut staged = self.collections.clone();
        apply_ops(&mut staged, &ops)?;
        // Only adopt the staged state once it is durable.
        self.write_snapshot(&staged)?;
        self.collections = staged;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaRecord {
    version: u32,
}

fn read_version(store: &dyn ObjectStore) -> Result<Option<u32>> {
    let Some(bytes) = store.get(collections::SCHEMA, "version")? else {
        return Ok(None);
    };
    let record: SchemaRecord = bincode::deserialize(&bytes)
        .map_err(|e| GridError::Schema(format!("corrupt schema record: {e}")))?;
    Ok(Some(record.version))
}

/// Bring a freshly opened store up to [`SCHEMA_VERSION`].
///
/// Upgrades are forward-only and touch nothing but the collections each
/// step names, so unrelated data survives. A version newer than this build
/// understands is fatal.
pub fn upgrade_schema(store: &mut dyn ObjectStore) -> Result<()> {
    let mut version = match read_version(store)? {
        Some(v) => v,
        None => {
            // Fresh database: create the full current layout.
            for name in collections::ALL {
                store.create_collection(name)?;
            }
            write_version(store, SCHEMA_VERSION)?;
            return Ok(());
        }
    };

    if version > SCHEMA_VERSION {
        return Err(GridError::Schema(format!(
            "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    while version < SCHEMA_VERSION {
        match version {
            // v1 kept the attention limit inside the legacy "attention"
            // collection; v2 moves it under dungeon_state.
            1 => {
                store.create_collection(collections::DUNGEON_STATE)?;
                if let Some(value) = store.get("attention", "attention")? {
                    store.commit(vec![WriteOp::put(
                        collections::DUNGEON_STATE,
                        "attention",
                        value,
                    )])?;
                }
                store.drop_collection("attention")?;
            }
            other => {
                return Err(GridError::Schema(format!(
                    "no upgrade path from schema v{other}"
                )));
            }
        }
        version += 1;
        write_version(store, version)?;
    }

    // Older upgrades may predate a collection added later; make sure the
    // current layout exists in full.
    for name in collections::ALL {
        store.create_collection(name)?;
    }
    Ok(())
}

fn write_version(store: &mut dyn ObjectStore, version: u32) -> Result<()> {
    store.create_collection(collections::SCHEMA)?;
    let bytes = bincode::serialize(&SchemaRecord { version })?;
    store.commit(vec![WriteOp::put(collections::SCHEMA, "version", bytes)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_is_atomic() {
        let mut store = MemoryStore::new();
        store.create_collection("a").unwrap();

        // Second op targets a collection that does not exist, so the first
        // op must not land either.
        let result = store.commit(vec![
            WriteOp::put("a", "k", vec![1]),
            WriteOp::put("missing", "k", vec![2]),
        ]);
        assert!(result.is_err());
        assert_eq!(store.get("a", "k").unwrap(), None);
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let mut store = MemoryStore::new();
        store.fail_next_commit();
        // Empty transactions never reach the failure path.
        store.commit(Vec::new()).unwrap();
    }

    #[test]
    fn test_fresh_schema_upgrade() {
        let mut store = MemoryStore::new();
        upgrade_schema(&mut store).unwrap();
        let mut names = store.collection_names();
        names.sort();
        let mut expected: Vec<String> =
            collections::ALL.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(read_version(&store).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_v1_migration_moves_attention() {
        let mut store = MemoryStore::new();
        store.create_collection("attention").unwrap();
        store.create_collection(collections::SCHEMA).unwrap();
        store
            .commit(vec![WriteOp::put("attention", "attention", vec![42])])
            .unwrap();
        write_version(&mut store, 1).unwrap();

        upgrade_schema(&mut store).unwrap();

        assert!(!store
            .collection_names()
            .contains(&"attention".to_string()));
        assert_eq!(
            store.get(collections::DUNGEON_STATE, "attention").unwrap(),
            Some(vec![42])
        );
        assert_eq!(read_version(&store).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_newer_schema_is_fatal() {
        let mut store = MemoryStore::new();
        write_version(&mut store, SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(
            upgrade_schema(&mut store),
            Err(GridError::Schema(_))
        ));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.db");

        let mut store = FileStore::open(&path).unwrap();
        store.create_collection("a").unwrap();
        store
            .commit(vec![WriteOp::put("a", "k", vec![7, 8, 9])])
            .unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a", "k").unwrap(), Some(vec![7, 8, 9]));
    }
}
