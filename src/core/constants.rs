//! Engine-wide constants for streaming, scheduling and persistence.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

use std::time::Duration;

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 32;

/// Smallest viewport buffer dimension in tiles, regardless of camera size.
pub const MIN_BUFFER_TILES: u32 = 8;

/// How many tiles the incoming buffer edge is placed beyond the camera view
/// when a movement shift is generated.
pub const EDGE_PAD_TILES: i32 = 2;

/// Size of the rest SafeZone relative to the active buffer pixel extent.
pub const BASE_SAFE_ZONE_RATIO: f64 = 0.4;

/// EMA weight of the previous velocity sample.
pub const VELOCITY_SMOOTHING: f64 = 0.7;

/// Speeds at or below this (px/ms) mean the camera is deemed stopped.
pub const STOP_THRESHOLD: f64 = 0.5;

/// Hard clamp applied to each smoothed velocity component (px/ms).
pub const MAX_SPEED: f64 = 10.0;

/// Instantaneous speeds above this (px/ms) are treated as a teleport,
/// not physical motion.
pub const TELEPORT_THRESHOLD: f64 = 20.0;

/// Horizon for the predicted camera position (ms).
pub const PREDICTION_TIME_MS: f64 = 300.0;

/// Edge-trigger ratio for the non-dominant motion axis.
pub const BASE_THRESHOLD: f64 = 0.33;

/// Edge-trigger ratio for the dominant motion axis.
pub const AGGRESSIVE_THRESHOLD: f64 = 0.50;

/// A velocity component dominates when its magnitude exceeds this factor
/// times the other component.
pub const DIRECTION_DOMINANCE_RATIO: f64 = 1.2;

/// Normalized direction components at or below this are ignored entirely.
pub const DIRECTION_DEADZONE: f64 = 0.1;

/// Delay between detecting a stop and submitting a recentering request.
pub const CENTER_DEBOUNCE_DELAY: Duration = Duration::from_millis(600);

/// Adaptive tick interval above [`FAST_SPEED_CUTOFF`].
pub const FAST_TICK: Duration = Duration::from_millis(50);

/// Adaptive tick interval between the stop threshold and the fast cutoff.
pub const MEDIUM_TICK: Duration = Duration::from_millis(100);

/// Adaptive tick interval when the camera is at rest.
pub const SLOW_TICK: Duration = Duration::from_millis(200);

/// Speed (px/ms) above which the fast tick interval is used.
pub const FAST_SPEED_CUTOFF: f64 = 2.0;

/// Samples with a delta outside [1, 1000] ms resync the velocity filter
/// instead of advancing it.
pub const MIN_SAMPLE_INTERVAL_MS: f64 = 1.0;
pub const MAX_SAMPLE_INTERVAL_MS: f64 = 1000.0;

/// Coalescing window for scheduler admission triggers.
pub const ADMISSION_DEBOUNCE: Duration = Duration::from_millis(100);

/// Granularity of active-task progression.
pub const PROGRESS_TICK: Duration = Duration::from_secs(1);

/// Delay before an opt-in greedy backfill pass runs.
pub const GREEDY_DELAY: Duration = Duration::from_secs(30);

/// Trailing throttle interval for the store autosave writer.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);
