//! EMA-smoothed camera velocity estimation.
//!
//! Samples arrive at tick granularity and carry their own timestamps in
//! milliseconds. Bad samples (non-finite position, delta outside the valid
//! window) resync the filter without advancing it; a delta implying an
//! instantaneous jump zeroes the filter entirely so the prediction never
//! chases a teleport.

use crate::core::config::StreamingConfig;
use crate::core::constants;

/// What a sample did to the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The filter was re-anchored but velocity did not advance.
    Resync,
    /// The jump exceeded the teleport threshold; the filter was zeroed.
    Teleport,
    /// Velocity and acceleration were updated.
    Updated,
}

#[derive(Debug, Clone)]
pub struct VelocityTracker {
    velocity: (f64, f64),
    acceleration: (f64, f64),
    last_pos: Option<(f64, f64)>,
    last_ms: f64,
    smoothing: f64,
    max_speed: f64,
    teleport_threshold: f64,
}

impl VelocityTracker {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            velocity: (0.0, 0.0),
            acceleration: (0.0, 0.0),
            last_pos: None,
            last_ms: 0.0,
            smoothing: config.velocity_smoothing,
            max_speed: config.max_speed,
            teleport_threshold: config.teleport_threshold,
        }
    }

    /// Feed one camera center sample taken at `now_ms`.
    pub fn sample(&mut self, pos: (f64, f64), now_ms: f64) -> SampleOutcome {
        if !pos.0.is_finite() || !pos.1.is_finite() {
            // Discard the sample entirely: the anchor stays paired so the
            // next valid sample measures its delta over the full gap.
            log::debug!("non-finite camera sample discarded");
            return SampleOutcome::Resync;
        }

        let Some(last) = self.last_pos else {
            self.last_pos = Some(pos);
            self.last_ms = now_ms;
            return SampleOutcome::Resync;
        };

        let dt = now_ms - self.last_ms;
        if !(constants::MIN_SAMPLE_INTERVAL_MS..=constants::MAX_SAMPLE_INTERVAL_MS).contains(&dt) {
            self.last_pos = Some(pos);
            self.last_ms = now_ms;
            return SampleOutcome::Resync;
        }

        let instant = ((pos.0 - last.0) / dt, (pos.1 - last.1) / dt);
        let instant_speed = (instant.0 * instant.0 + instant.1 * instant.1).sqrt();
        if instant_speed > self.teleport_threshold {
            self.reset(pos, now_ms);
            return SampleOutcome::Teleport;
        }

        let a = self.smoothing;
        let prev = self.velocity;
        let vx = (a * prev.0 + (1.0 - a) * instant.0).clamp(-self.max_speed, self.max_speed);
        let vy = (a * prev.1 + (1.0 - a) * instant.1).clamp(-self.max_speed, self.max_speed);
        self.velocity = (vx, vy);
        self.acceleration = ((vx - prev.0) / dt, (vy - prev.1) / dt);
        self.last_pos = Some(pos);
        self.last_ms = now_ms;
        SampleOutcome::Updated
    }

    /// Zero the filter and anchor at the given sample.
    pub fn reset(&mut self, pos: (f64, f64), now_ms: f64) {
        self.velocity = (0.0, 0.0);
        self.acceleration = (0.0, 0.0);
        self.last_pos = Some(pos);
        self.last_ms = now_ms;
    }

    pub fn velocity(&self) -> (f64, f64) {
        self.velocity
    }

    pub fn acceleration(&self) -> (f64, f64) {
        self.acceleration
    }

    pub fn speed(&self) -> f64 {
        (self.velocity.0 * self.velocity.0 + self.velocity.1 * self.velocity.1).sqrt()
    }
}
