//! The tilemap streaming engine.
//!
//! Owns two fixed-size viewport buffers and keeps exactly one of them
//! visible and correct under continuous camera motion. A self-driven
//! adaptive tick samples the camera, filters its velocity and decides when
//! a regeneration is needed; rectangular window reads are served by the
//! world store worker and blitted into the scratch buffer, which is then
//! swapped in atomically. Queries from the render loop only ever observe a
//! complete buffer with one well-defined anchor.
//!
//! At most one generation is in flight. A single pending slot holds the
//! next desired direction; movement requests supersede queued center
//! requests but never the other way around.

use crate::core::{
    bounds::PixelBounds,
    camera::{CameraReader, CameraSpec},
    config::StreamingConfig,
    grid::{TileGrid, TileIndex, WorldCoord, EMPTY_TILE},
};
use crate::layers::buffer::BufferLayer;
use crate::store::worker::StoreHandle;
use crate::streaming::{
    predictor::{self, Direction},
    safe_zone,
    velocity::{SampleOutcome, VelocityTracker},
};
use crate::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Anchor that centers the buffer on the given camera pixel.
fn center_anchor(center: (f64, f64), dims: (u32, u32), tile_size: u32) -> WorldCoord {
    let t = f64::from(tile_size);
    WorldCoord::new(
        (center.0 / t).floor() as i32 - dims.0 as i32 / 2,
        (center.1 / t).floor() as i32 - dims.1 as i32 / 2,
    )
}

/// Anchor for a movement shift: the incoming edge lands `pad` tiles beyond
/// the camera view on each moving axis; a still axis stays centered.
fn movement_anchor(
    dir: Direction,
    view: &PixelBounds,
    center: (f64, f64),
    dims: (u32, u32),
    tile_size: u32,
    pad: i32,
) -> WorldCoord {
    let t = f64::from(tile_size);
    let (w, h) = (dims.0 as i32, dims.1 as i32);
    let x = match dir.x {
        1 => (view.right / t).floor() as i32 + pad - (w - 1),
        -1 => (view.left / t).floor() as i32 - pad,
        _ => (center.0 / t).floor() as i32 - w / 2,
    };
    let y = match dir.y {
        1 => (view.bottom / t).floor() as i32 + pad - (h - 1),
        -1 => (view.top / t).floor() as i32 - pad,
        _ => (center.1 / t).floor() as i32 - h / 2,
    };
    WorldCoord::new(x, y)
}

/// State visible to render-loop queries. Everything the swap protocol
/// touches lives behind one lock so a swap is atomic to observers.
struct Shared {
    buffers: [BufferLayer; 2],
    anchors: [WorldCoord; 2],
    active: usize,
    safe_zone: PixelBounds,
    generations: u64,
    destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Idle,
    Generating { target: WorldCoord, dir: Direction },
}

struct JobOutcome {
    target: WorldCoord,
    dir: Direction,
    result: Result<TileGrid>,
}

/// The streaming engine handle. Constructing one spawns the internal
/// driver; no external update call is needed.
pub struct StreamEngine {
    shared: Arc<Mutex<Shared>>,
    camera: Arc<dyn CameraReader>,
    dims: (u32, u32),
    driver: tokio::task::JoinHandle<()>,
}

impl StreamEngine {
    /// Create an engine with default tuning. Must be called from within a
    /// tokio runtime; an initial generation centered on the camera is
    /// scheduled immediately.
    pub fn new(spec: CameraSpec, camera: Arc<dyn CameraReader>, store: StoreHandle) -> Self {
        Self::with_config(spec, camera, store, StreamingConfig::default())
    }

    pub fn with_config(
        spec: CameraSpec,
        camera: Arc<dyn CameraReader>,
        store: StoreHandle,
        config: StreamingConfig,
    ) -> Self {
        let (shared, driver) = build(spec, camera.clone(), store, config);
        let dims = driver.dims;
        let initial = driver.active_anchor();
        let handle = tokio::spawn(driver.run());

        log::debug!(
            "streaming engine up: {}x{} tiles, initial anchor ({}, {})",
            dims.0,
            dims.1,
            initial.x,
            initial.y
        );

        Self {
            shared,
            camera,
            dims,
            driver: handle,
        }
    }

    /// Fast path for callers that want to skip surrounding work while the
    /// camera sits safely inside the active buffer.
    pub fn is_camera_in_safe_zone(&self) -> bool {
        let (x, y) = self.camera.center();
        self.shared
            .lock()
            .map(|s| s.safe_zone.contains(x, y))
            .unwrap_or(false)
    }

    /// Look up the currently displayed tile under a world pixel. `None`
    /// when the pixel is outside the active buffer or the cell is empty.
    pub fn tile_at_world_pixel(&self, x: f64, y: f64) -> Option<TileIndex> {
        let s = self.shared.lock().ok()?;
        let active = &s.buffers[s.active];
        let (i, j) = active.world_to_tile_xy(x, y)?;
        let index = active.get_tile_at(i, j);
        if index == EMPTY_TILE {
            None
        } else {
            Some(index)
        }
    }

    /// True iff the world cell is present in the active buffer or at least
    /// one of its 4-neighbors is. Used by editor placement validation.
    pub fn is_tile_connected(&self, x: i32, y: i32) -> bool {
        let Ok(s) = self.shared.lock() else {
            return false;
        };
        let anchor = s.anchors[s.active];
        let active = &s.buffers[s.active];
        let has = |c: WorldCoord| {
            let i = c.x - anchor.x;
            let j = c.y - anchor.y;
            i >= 0 && j >= 0 && active.has_tile_at(i as u32, j as u32)
        };
        let cell = WorldCoord::new(x, y);
        has(cell) || cell.neighbors4().into_iter().any(has)
    }

    /// Overwrite the visible buffer cell for a world coordinate. Cells
    /// outside the active buffer are a no-op; the world store is the
    /// source of truth and is written by the editor separately.
    pub fn update_tile(&self, x: i32, y: i32, index: TileIndex) {
        if let Ok(mut s) = self.shared.lock() {
            let active = s.active;
            let anchor = s.anchors[active];
            let (w, h) = s.buffers[active].grid_size();
            let i = x - anchor.x;
            let j = y - anchor.y;
            if i >= 0 && j >= 0 && (i as u32) < w && (j as u32) < h {
                s.buffers[active].put_tile_at(index, i as u32, j as u32);
            }
        }
    }

    /// Anchor of the active buffer.
    pub fn active_anchor(&self) -> WorldCoord {
        self.shared
            .lock()
            .map(|s| s.anchors[s.active])
            .unwrap_or(WorldCoord::new(0, 0))
    }

    /// Current SafeZone rectangle.
    pub fn safe_zone(&self) -> PixelBounds {
        self.shared
            .lock()
            .map(|s| s.safe_zone)
            .unwrap_or_default()
    }

    /// Buffer dimensions in tiles, fixed at construction.
    pub fn buffer_dims(&self) -> (u32, u32) {
        self.dims
    }

    /// Number of successfully applied generations so far.
    pub fn generations(&self) -> u64 {
        self.shared.lock().map(|s| s.generations).unwrap_or(0)
    }

    /// Stop the driver and all debounced work. Safe to call repeatedly;
    /// an in-flight window read is discarded when it completes.
    pub fn destroy(&self) {
        if let Ok(mut s) = self.shared.lock() {
            if s.destroyed {
                return;
            }
            s.destroyed = true;
        }
        self.driver.abort();
        log::debug!("streaming engine destroyed");
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Build the shared state and the driver without spawning it; the tests
/// drive the state machine by hand through the same parts.
fn build(
    spec: CameraSpec,
    camera: Arc<dyn CameraReader>,
    store: StoreHandle,
    config: StreamingConfig,
) -> (Arc<Mutex<Shared>>, Driver) {
    let dims = spec.buffer_dims(config.tile_size);
    let initial = center_anchor(camera.center(), dims, config.tile_size);
    let t = f64::from(config.tile_size);

    let mut buffers = [
        BufferLayer::new(dims.0, dims.1, config.tile_size),
        BufferLayer::new(dims.0, dims.1, config.tile_size),
    ];
    for buffer in &mut buffers {
        buffer.set_position(f64::from(initial.x) * t, f64::from(initial.y) * t);
    }
    let zone = safe_zone::compute(&buffers[0].bounds(), config.safe_zone_ratio);

    let shared = Arc::new(Mutex::new(Shared {
        buffers,
        anchors: [initial, initial],
        active: 0,
        safe_zone: zone,
        generations: 0,
        destroyed: false,
    }));

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let driver = Driver {
        shared: shared.clone(),
        camera,
        store,
        config: config.clone(),
        dims,
        tracker: VelocityTracker::new(&config),
        job: JobState::Idle,
        pending: None,
        center_deadline: None,
        outcome_tx,
        outcome_rx,
        epoch: Instant::now(),
    };
    (shared, driver)
}

struct Driver {
    shared: Arc<Mutex<Shared>>,
    camera: Arc<dyn CameraReader>,
    store: StoreHandle,
    config: StreamingConfig,
    dims: (u32, u32),
    tracker: VelocityTracker,
    job: JobState,
    pending: Option<Direction>,
    center_deadline: Option<Instant>,
    outcome_tx: mpsc::UnboundedSender<JobOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<JobOutcome>,
    epoch: Instant,
}

impl Driver {
    async fn run(mut self) {
        // Initial generation centered on the camera.
        let initial = self.target_for(Direction::ZERO);
        self.submit(initial, Direction::ZERO);

        loop {
            if self.is_destroyed() {
                return;
            }
            let interval = self.tick_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let now = Instant::now();
                    self.on_tick(now);
                }
                Some(outcome) = self.outcome_rx.recv() => {
                    self.on_generation_complete(outcome);
                }
            }
        }
    }

    /// Tick cadence adapts to speed: responsive while the camera flies,
    /// nearly idle while it rests.
    fn tick_interval(&self) -> Duration {
        let speed = self.tracker.speed();
        if speed > self.config.fast_speed_cutoff {
            self.config.fast_tick
        } else if speed > self.config.stop_threshold {
            self.config.medium_tick
        } else {
            self.config.slow_tick
        }
    }

    fn on_tick(&mut self, now: Instant) {
        let pos = self.camera.center();
        let now_ms = now.duration_since(self.epoch).as_secs_f64() * 1000.0;

        match self.tracker.sample(pos, now_ms) {
            SampleOutcome::Resync => return,
            SampleOutcome::Teleport => {
                log::debug!("teleport detected, recentering on ({:.0}, {:.0})", pos.0, pos.1);
                self.center_deadline = None;
                self.request(Direction::ZERO);
                return;
            }
            SampleOutcome::Updated => {}
        }

        let in_safe_zone = self.safe_zone().contains(pos.0, pos.1);

        if self.tracker.speed() < self.config.stop_threshold {
            if in_safe_zone {
                self.center_deadline = None;
                return;
            }
            match self.center_deadline {
                None => {
                    self.center_deadline = Some(now + self.config.center_debounce);
                }
                Some(deadline) if now >= deadline => {
                    self.center_deadline = None;
                    self.request(Direction::ZERO);
                }
                Some(_) => {}
            }
            return;
        }

        // Moving again: a scheduled recenter no longer applies.
        self.center_deadline = None;
        if in_safe_zone {
            return;
        }

        let predicted = predictor::predict_position(
            pos,
            self.tracker.velocity(),
            self.tracker.acceleration(),
            self.config.prediction_time_ms,
        );
        let anchor = self.active_anchor();
        let dir = predictor::direction_for(
            predicted,
            self.tracker.velocity(),
            anchor,
            self.dims.0,
            self.dims.1,
            &self.config,
        );
        if !dir.is_zero() {
            self.request(dir);
        }
    }

    /// The per-job-slot state machine. Zero direction means a center
    /// request.
    fn request(&mut self, dir: Direction) {
        match self.job {
            JobState::Idle => {
                let target = self.target_for(dir);
                self.pending = None;
                if target == self.active_anchor() {
                    return;
                }
                self.submit(target, dir);
            }
            JobState::Generating { .. } => {
                if dir.is_zero() {
                    // A center request never displaces a queued movement.
                    if self.pending.is_none() {
                        self.pending = Some(dir);
                    }
                } else {
                    self.pending = Some(dir);
                }
            }
        }
    }

    fn target_for(&self, dir: Direction) -> WorldCoord {
        let center = self.camera.center();
        if dir.is_zero() {
            center_anchor(center, self.dims, self.config.tile_size)
        } else {
            movement_anchor(
                dir,
                &self.camera.world_view(),
                center,
                self.dims,
                self.config.tile_size,
                self.config.edge_pad_tiles,
            )
        }
    }

    fn submit(&mut self, target: WorldCoord, dir: Direction) {
        self.job = JobState::Generating { target, dir };
        log::debug!(
            "generating {}x{} window at anchor ({}, {}), dir {}",
            self.dims.0,
            self.dims.1,
            target.x,
            target.y,
            dir
        );
        let store = self.store.clone();
        let tx = self.outcome_tx.clone();
        let (w, h) = self.dims;
        tokio::spawn(async move {
            let result = store.tile_window(None, w, h, target.x, target.y).await;
            let _ = tx.send(JobOutcome { target, dir, result });
        });
    }

    fn on_generation_complete(&mut self, outcome: JobOutcome) {
        let JobState::Generating { target, dir } = self.job else {
            return;
        };
        if outcome.target != target {
            // Superseded by a newer submission; obsolete result, not an error.
            return;
        }
        self.job = JobState::Idle;

        let grid = match outcome.result {
            Ok(grid) => grid,
            Err(e) => {
                // Keep the old buffer visible; the next tick re-emits a
                // request through normal predictive logic.
                log::warn!("buffer generation failed: {}", e);
                self.pending = None;
                return;
            }
        };

        if let Some(next) = self.pending.take() {
            if next != dir {
                let next_target = self.target_for(next);
                if next_target != target {
                    // Chain straight into the newer request; this result
                    // is never shown.
                    self.submit(next_target, next);
                    return;
                }
            }
        }
        self.apply(target, grid);
    }

    /// The swap protocol. Runs entirely under the shared lock so observers
    /// never see zero or two visible buffers.
    fn apply(&mut self, target: WorldCoord, grid: TileGrid) {
        let t = f64::from(self.config.tile_size);
        if let Ok(mut s) = self.shared.lock() {
            if s.destroyed {
                return;
            }
            let scratch = 1 - s.active;
            s.buffers[scratch].set_visible(false);
            s.buffers[scratch].set_position(f64::from(target.x) * t, f64::from(target.y) * t);
            s.buffers[scratch].put_tiles_at(grid);
            s.anchors[scratch] = target;
            s.buffers[scratch].set_visible(true);
            s.active = scratch;
            let inactive = 1 - s.active;
            s.buffers[inactive].set_visible(false);
            let bounds = s.buffers[s.active].bounds();
            s.safe_zone = safe_zone::compute(&bounds, self.config.safe_zone_ratio);
            s.generations += 1;
            log::debug!(
                "applied generation {} at anchor ({}, {})",
                s.generations,
                target.x,
                target.y
            );
        }
    }

    fn is_destroyed(&self) -> bool {
        self.shared.lock().map(|s| s.destroyed).unwrap_or(true)
    }

    fn safe_zone(&self) -> PixelBounds {
        self.shared
            .lock()
            .map(|s| s.safe_zone)
            .unwrap_or_default()
    }

    fn active_anchor(&self) -> WorldCoord {
        self.shared
            .lock()
            .map(|s| s.anchors[s.active])
            .unwrap_or(WorldCoord::new(0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_anchor_centers_camera() {
        // 16x16 buffer, camera at the origin: anchor (-8, -8)
        assert_eq!(
            center_anchor((0.0, 0.0), (16, 16), 32),
            WorldCoord::new(-8, -8)
        );
        // Camera at (100, 200): cell (3, 6), anchor (-5, -2)
        assert_eq!(
            center_anchor((100.0, 200.0), (16, 16), 32),
            WorldCoord::new(-5, -2)
        );
    }

    #[test]
    fn test_movement_anchor_east_pads_past_view() {
        let view = PixelBounds::from_center_and_size(0.0, 0.0, 512.0, 512.0);
        let anchor = movement_anchor(
            Direction::new(1, 0),
            &view,
            (0.0, 0.0),
            (16, 16),
            32,
            2,
        );
        // view.right = 256 -> cell 8; rightmost buffer column = 8 + 2 = 10
        assert_eq!(anchor.x + 15, 10);
        // Still axis stays centered
        assert_eq!(anchor.y, -8);

        // The buffer's right edge sits at least two tiles past the view
        let right_edge_px = f64::from(anchor.x + 16) * 32.0;
        assert!(right_edge_px >= view.right + 2.0 * 32.0);
    }

    #[test]
    fn test_movement_anchor_west_pads_past_view() {
        let view = PixelBounds::from_center_and_size(0.0, 0.0, 512.0, 512.0);
        let anchor = movement_anchor(
            Direction::new(-1, 0),
            &view,
            (0.0, 0.0),
            (16, 16),
            32,
            2,
        );
        // view.left = -256 -> cell -8; leftmost column = -8 - 2 = -10
        assert_eq!(anchor.x, -10);
        assert_eq!(anchor.y, -8);
    }

    #[test]
    fn test_movement_anchor_diagonal() {
        let view = PixelBounds::from_center_and_size(0.0, 0.0, 512.0, 512.0);
        let anchor = movement_anchor(
            Direction::new(1, -1),
            &view,
            (0.0, 0.0),
            (16, 16),
            32,
            2,
        );
        assert_eq!(anchor.x + 15, 10);
        assert_eq!(anchor.y, -10);
    }

    use crate::core::camera::SharedCamera;
    use crate::core::config::StoreConfig;
    use crate::store::worker::WorldStore;

    fn test_parts() -> (Arc<Mutex<Shared>>, Driver) {
        let store = WorldStore::in_memory(StoreConfig::for_testing());
        let camera: Arc<dyn CameraReader> =
            Arc::new(SharedCamera::new((0.0, 0.0), 256.0, 256.0, 1.0));
        build(
            CameraSpec::new(256.0, 256.0, 1.0),
            camera,
            store,
            StreamingConfig::for_testing(),
        )
    }

    #[tokio::test]
    async fn test_movement_supersedes_queued_center() {
        let (_shared, mut driver) = test_parts();

        // Occupy the job slot.
        driver.request(Direction::new(1, 0));
        assert!(matches!(driver.job, JobState::Generating { .. }));

        // A center request queues into the empty pending slot...
        driver.request(Direction::ZERO);
        assert_eq!(driver.pending, Some(Direction::ZERO));
        // ...a movement displaces it...
        driver.request(Direction::new(0, 1));
        assert_eq!(driver.pending, Some(Direction::new(0, 1)));
        // ...and a later center cannot displace the movement.
        driver.request(Direction::ZERO);
        assert_eq!(driver.pending, Some(Direction::new(0, 1)));
        // A newer movement overwrites an older one.
        driver.request(Direction::new(-1, 0));
        assert_eq!(driver.pending, Some(Direction::new(-1, 0)));
    }

    #[tokio::test]
    async fn test_apply_swaps_buffers_atomically() {
        let (shared, mut driver) = test_parts();

        driver.request(Direction::new(1, 0));
        let JobState::Generating { target, dir } = driver.job else {
            panic!("expected a generation in flight");
        };
        driver.on_generation_complete(JobOutcome {
            target,
            dir,
            result: Ok(TileGrid::empty(16, 16)),
        });

        let s = shared.lock().unwrap();
        assert_eq!(s.generations, 1);
        assert_eq!(s.anchors[s.active], target);
        // Exactly one buffer visible after the swap
        assert!(s.buffers[s.active].is_visible());
        assert!(!s.buffers[1 - s.active].is_visible());
        // SafeZone recomputed around the new active buffer
        assert_eq!(s.safe_zone.center(), s.buffers[s.active].bounds().center());
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let (shared, mut driver) = test_parts();

        driver.request(Direction::new(1, 0));
        let JobState::Generating { dir, .. } = driver.job else {
            panic!("expected a generation in flight");
        };
        // A result for some other anchor: obsolete, silently dropped.
        driver.on_generation_complete(JobOutcome {
            target: WorldCoord::new(999, 999),
            dir,
            result: Ok(TileGrid::empty(16, 16)),
        });

        assert!(matches!(driver.job, JobState::Generating { .. }));
        assert_eq!(shared.lock().unwrap().generations, 0);
    }

    #[tokio::test]
    async fn test_failed_generation_keeps_old_buffer() {
        let (shared, mut driver) = test_parts();

        driver.request(Direction::new(1, 0));
        let JobState::Generating { target, dir } = driver.job else {
            panic!("expected a generation in flight");
        };
        driver.on_generation_complete(JobOutcome {
            target,
            dir,
            result: Err(crate::GridError::StoreClosed),
        });

        assert_eq!(driver.job, JobState::Idle);
        assert_eq!(shared.lock().unwrap().generations, 0);
    }

    #[tokio::test]
    async fn test_pending_direction_chains_without_applying() {
        let (shared, mut driver) = test_parts();

        driver.request(Direction::new(1, 0));
        let JobState::Generating { target, dir } = driver.job else {
            panic!("expected a generation in flight");
        };
        // Camera now wants the opposite direction.
        driver.request(Direction::new(-1, 0));
        driver.on_generation_complete(JobOutcome {
            target,
            dir,
            result: Ok(TileGrid::empty(16, 16)),
        });

        // The first result was never shown; a new generation for the
        // pending direction is in flight instead.
        assert_eq!(shared.lock().unwrap().generations, 0);
        match driver.job {
            JobState::Generating { dir, .. } => assert_eq!(dir, Direction::new(-1, 0)),
            JobState::Idle => panic!("expected the pending request to chain"),
        }
        assert_eq!(driver.pending, None);
    }
}
