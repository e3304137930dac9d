//! Prelude module for common gridforge types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use gridforge::prelude::*;`

// Core types
pub use crate::core::{
    bounds::PixelBounds,
    camera::{CameraReader, CameraSpec, SharedCamera},
    config::{SchedulerConfig, StoreConfig, StreamingConfig},
    grid::{TileGrid, TileIndex, WorldCoord, EMPTY_TILE},
};

// Viewport buffer layer
pub use crate::layers::buffer::BufferLayer;

// Streaming engine
pub use crate::streaming::{engine::StreamEngine, predictor::Direction};

// Scheduler
pub use crate::scheduler::{
    attention::AttentionScheduler,
    pools::PoolSet,
    task::{PoolKind, Task, TaskId, TaskSpec},
};

// Persistence
pub use crate::store::{
    backend::{FileStore, MemoryStore, ObjectStore, WriteOp},
    worker::{PoolSnapshot, StoreHandle, StoreStats, WorldStore},
};

// Result and Error types
pub use crate::{Error, Result};

// Common standard library re-exports with better performance hashmaps
pub use std::{sync::Arc, time::Duration};

// Use FxHashMap and FxHashSet for better performance
pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
