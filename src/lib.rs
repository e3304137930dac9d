//! # Gridforge
//!
//! The engineering core of an infinite-tilemap editor.
//!
//! Three cooperating subsystems live here: a predictive, double-buffered
//! tilemap streaming engine that keeps a finite viewport buffer centered on
//! a moving camera, an attention scheduler that admits long-running tasks
//! into a bounded budget, and a persistent world store worker that owns the
//! sparse world map and serves it asynchronously.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod scheduler;
pub mod store;
pub mod streaming;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::PixelBounds,
    camera::{CameraReader, CameraSpec, SharedCamera},
    grid::{TileGrid, TileIndex, WorldCoord, EMPTY_TILE},
};

pub use crate::layers::buffer::BufferLayer;

pub use crate::scheduler::{
    attention::AttentionScheduler,
    task::{PoolKind, Task, TaskId, TaskSpec},
};

pub use crate::store::{
    backend::{FileStore, MemoryStore, ObjectStore},
    worker::{StoreHandle, WorldStore},
};

pub use crate::streaming::engine::StreamEngine;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, GridError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("store worker is closed")]
    StoreClosed,

    #[error("store error: {0}")]
    Store(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Error type alias for convenience
pub type Error = GridError;
