//! Configuration for the three subsystems.
//!
//! Every knob defaults to the engine-wide constant of the same name; the
//! `for_testing` presets shrink the timing knobs so integration tests can
//! run under paused time without waiting out real debounce windows.

use crate::core::constants;
use std::time::Duration;

/// Tuning knobs for the tilemap streaming engine.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Square tile size in pixels.
    pub tile_size: u32,
    /// Size of the rest SafeZone relative to the active buffer extent.
    pub safe_zone_ratio: f64,
    /// EMA weight of the previous velocity.
    pub velocity_smoothing: f64,
    /// Speeds at or below this (px/ms) mean "stopped".
    pub stop_threshold: f64,
    /// Hard clamp per velocity component (px/ms).
    pub max_speed: f64,
    /// Instantaneous speeds above this (px/ms) reset the filter.
    pub teleport_threshold: f64,
    /// Horizon for the predicted camera position (ms).
    pub prediction_time_ms: f64,
    /// Edge trigger ratio, non-dominant axis.
    pub base_threshold: f64,
    /// Edge trigger ratio, dominant axis.
    pub aggressive_threshold: f64,
    /// Axis-dominance factor.
    pub dominance_ratio: f64,
    /// Stop-to-recenter delay.
    pub center_debounce: Duration,
    /// Adaptive tick intervals (fast / medium / slow).
    pub fast_tick: Duration,
    pub medium_tick: Duration,
    pub slow_tick: Duration,
    /// Speed above which the fast tick applies (px/ms).
    pub fast_speed_cutoff: f64,
    /// Tiles the incoming edge is pushed beyond the camera view on a shift.
    pub edge_pad_tiles: i32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            tile_size: constants::TILE_SIZE,
            safe_zone_ratio: constants::BASE_SAFE_ZONE_RATIO,
            velocity_smoothing: constants::VELOCITY_SMOOTHING,
            stop_threshold: constants::STOP_THRESHOLD,
            max_speed: constants::MAX_SPEED,
            teleport_threshold: constants::TELEPORT_THRESHOLD,
            prediction_time_ms: constants::PREDICTION_TIME_MS,
            base_threshold: constants::BASE_THRESHOLD,
            aggressive_threshold: constants::AGGRESSIVE_THRESHOLD,
            dominance_ratio: constants::DIRECTION_DOMINANCE_RATIO,
            center_debounce: constants::CENTER_DEBOUNCE_DELAY,
            fast_tick: constants::FAST_TICK,
            medium_tick: constants::MEDIUM_TICK,
            slow_tick: constants::SLOW_TICK,
            fast_speed_cutoff: constants::FAST_SPEED_CUTOFF,
            edge_pad_tiles: constants::EDGE_PAD_TILES,
        }
    }
}

impl StreamingConfig {
    /// Preset with short timers for tests.
    pub fn for_testing() -> Self {
        Self {
            center_debounce: Duration::from_millis(60),
            fast_tick: Duration::from_millis(5),
            medium_tick: Duration::from_millis(10),
            slow_tick: Duration::from_millis(20),
            ..Default::default()
        }
    }
}

/// Tuning knobs for the attention scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Coalescing window for admission triggers.
    pub admission_debounce: Duration,
    /// Granularity of active-task progression.
    pub progress_tick: Duration,
    /// Delay before a greedy backfill pass runs.
    pub greedy_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            admission_debounce: constants::ADMISSION_DEBOUNCE,
            progress_tick: constants::PROGRESS_TICK,
            greedy_delay: constants::GREEDY_DELAY,
        }
    }
}

impl SchedulerConfig {
    /// Preset with short timers for tests.
    pub fn for_testing() -> Self {
        Self {
            admission_debounce: Duration::from_millis(10),
            progress_tick: Duration::from_millis(50),
            greedy_delay: Duration::from_millis(200),
        }
    }
}

/// Tuning knobs for the persistent world store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Trailing throttle interval for the autosave writer.
    pub autosave_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            autosave_interval: constants::AUTOSAVE_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Preset with a short autosave window for tests.
    pub fn for_testing() -> Self {
        Self {
            autosave_interval: Duration::from_millis(50),
        }
    }
}
