//! Predictive need detection.
//!
//! Extrapolates the camera a fixed horizon ahead with a quadratic motion
//! model, places the predicted position inside the active buffer and
//! decides whether a shift toward an edge is warranted. All pure
//! functions, so the engine's decisions can be tested without timers.

use crate::core::config::StreamingConfig;
use crate::core::constants;
use crate::core::grid::WorldCoord;

/// A per-axis shift request: each component is -1, 0 or +1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Direction {
    pub x: i8,
    pub y: i8,
}

impl Direction {
    pub const ZERO: Direction = Direction { x: 0, y: 0 };

    pub fn new(x: i8, y: i8) -> Self {
        Self { x, y }
    }

    /// A zero direction means "center", a non-zero one "shift".
    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:+}, {:+})", self.x, self.y)
    }
}

/// Predicted camera position after the configured horizon:
/// `p = pos + v*t + a*t^2/2`.
pub fn predict_position(
    pos: (f64, f64),
    velocity: (f64, f64),
    acceleration: (f64, f64),
    horizon_ms: f64,
) -> (f64, f64) {
    let t = horizon_ms;
    (
        pos.0 + velocity.0 * t + 0.5 * acceleration.0 * t * t,
        pos.1 + velocity.1 * t + 0.5 * acceleration.1 * t * t,
    )
}

/// Decide a shift direction for a predicted position against the active
/// buffer anchored at `anchor` with `width x height` cells.
///
/// A predicted cell outside the buffer points straight at the side it
/// left. Inside the buffer, each axis of the normalized motion direction
/// triggers when the predicted cell sits within the edge zone on the side
/// the camera is heading toward; the dominant axis uses the aggressive
/// (larger) zone.
pub fn direction_for(
    predicted: (f64, f64),
    velocity: (f64, f64),
    anchor: WorldCoord,
    width: u32,
    height: u32,
    config: &StreamingConfig,
) -> Direction {
    let cell = WorldCoord::from_pixel(predicted.0, predicted.1, config.tile_size);
    let cell_x = i64::from(cell.x) - i64::from(anchor.x);
    let cell_y = i64::from(cell.y) - i64::from(anchor.y);
    let w = i64::from(width);
    let h = i64::from(height);

    // Outside the buffer: point at the out-of-bounds side directly.
    let out = Direction::new(
        if cell_x < 0 {
            -1
        } else if cell_x >= w {
            1
        } else {
            0
        },
        if cell_y < 0 {
            -1
        } else if cell_y >= h {
            1
        } else {
            0
        },
    );
    if !out.is_zero() {
        return out;
    }

    let speed = (velocity.0 * velocity.0 + velocity.1 * velocity.1).sqrt();
    if speed <= 0.0 {
        return Direction::ZERO;
    }
    let dir = (velocity.0 / speed, velocity.1 / speed);

    let x_dominant = dir.0.abs() > config.dominance_ratio * dir.1.abs();
    let y_dominant = dir.1.abs() > config.dominance_ratio * dir.0.abs();
    let threshold_x = if x_dominant {
        config.aggressive_threshold
    } else {
        config.base_threshold
    };
    let threshold_y = if y_dominant {
        config.aggressive_threshold
    } else {
        config.base_threshold
    };

    let mut result = Direction::ZERO;
    if dir.0.abs() > constants::DIRECTION_DEADZONE {
        let edge = w as f64 * threshold_x;
        if dir.0 > 0.0 && cell_x as f64 >= w as f64 - edge {
            result.x = 1;
        } else if dir.0 < 0.0 && (cell_x as f64) < edge {
            result.x = -1;
        }
    }
    if dir.1.abs() > constants::DIRECTION_DEADZONE {
        let edge = h as f64 * threshold_y;
        if dir.1 > 0.0 && cell_y as f64 >= h as f64 - edge {
            result.y = 1;
        } else if dir.1 < 0.0 && (cell_y as f64) < edge {
            result.y = -1;
        }
    }
    result
}
