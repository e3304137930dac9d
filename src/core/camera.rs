use crate::core::{bounds::PixelBounds, constants};
use std::sync::Mutex;

/// Synchronous view of the camera sampled by the streaming engine on every
/// tick. Implemented by the host's camera controller; all reads must be
/// cheap and non-blocking.
pub trait CameraReader: Send + Sync {
    /// Camera center in world pixels.
    fn center(&self) -> (f64, f64);

    /// The world pixel rectangle currently visible on screen.
    fn world_view(&self) -> PixelBounds;

    /// Screen size in pixels.
    fn screen_size(&self) -> (f64, f64);

    /// Current zoom factor (world pixels per screen pixel is `1 / zoom`).
    fn zoom(&self) -> f64;
}

/// Static camera parameters the engine sizes its buffers from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSpec {
    /// Camera width in screen pixels.
    pub width: f64,
    /// Camera height in screen pixels.
    pub height: f64,
    /// The smallest zoom the host allows (maximum zoom-out).
    pub min_zoom: f64,
}

impl CameraSpec {
    pub fn new(width: f64, height: f64, min_zoom: f64) -> Self {
        Self {
            width,
            height,
            min_zoom,
        }
    }

    /// Buffer dimensions in tiles: enough to cover at least two visible
    /// viewports at maximum zoom-out. Fixed for the engine's lifetime.
    pub fn buffer_dims(&self, tile_size: u32) -> (u32, u32) {
        let zoom = if self.min_zoom > 0.0 { self.min_zoom } else { 1.0 };
        let t = f64::from(tile_size);
        let w = (2.0 * self.width / (zoom * t)).ceil() as u32;
        let h = (2.0 * self.height / (zoom * t)).ceil() as u32;
        (
            w.max(constants::MIN_BUFFER_TILES),
            h.max(constants::MIN_BUFFER_TILES),
        )
    }
}

/// A [`CameraReader`] backed by shared interior state.
///
/// Handy for hosts that update the camera from input handling and for
/// tests that script camera motion.
#[derive(Debug)]
pub struct SharedCamera {
    state: Mutex<CameraState>,
}

#[derive(Debug, Clone, Copy)]
struct CameraState {
    center: (f64, f64),
    width: f64,
    height: f64,
    zoom: f64,
}

impl SharedCamera {
    pub fn new(center: (f64, f64), width: f64, height: f64, zoom: f64) -> Self {
        Self {
            state: Mutex::new(CameraState {
                center,
                width,
                height,
                zoom,
            }),
        }
    }

    pub fn set_center(&self, x: f64, y: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.center = (x, y);
        }
    }

    pub fn set_zoom(&self, zoom: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.zoom = zoom;
        }
    }

    pub fn pan_by(&self, dx: f64, dy: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.center.0 += dx;
            state.center.1 += dy;
        }
    }

    fn snapshot(&self) -> CameraState {
        self.state.lock().map(|s| *s).unwrap_or(CameraState {
            center: (0.0, 0.0),
            width: 0.0,
            height: 0.0,
            zoom: 1.0,
        })
    }
}

impl CameraReader for SharedCamera {
    fn center(&self) -> (f64, f64) {
        self.snapshot().center
    }

    fn world_view(&self) -> PixelBounds {
        let s = self.snapshot();
        let zoom = if s.zoom > 0.0 { s.zoom } else { 1.0 };
        PixelBounds::from_center_and_size(s.center.0, s.center.1, s.width / zoom, s.height / zoom)
    }

    fn screen_size(&self) -> (f64, f64) {
        let s = self.snapshot();
        (s.width, s.height)
    }

    fn zoom(&self) -> f64 {
        self.snapshot().zoom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_dims_cover_two_viewports() {
        // 512px wide camera, min zoom 1.0, 32px tiles: 2 * 512 / 32 = 32 tiles
        let spec = CameraSpec::new(512.0, 256.0, 1.0);
        assert_eq!(spec.buffer_dims(32), (32, 16));

        // Zoomed out to 0.5, each screen pixel shows 2 world pixels
        let spec = CameraSpec::new(512.0, 256.0, 0.5);
        assert_eq!(spec.buffer_dims(32), (64, 32));
    }

    #[test]
    fn test_buffer_dims_floor() {
        let spec = CameraSpec::new(32.0, 32.0, 1.0);
        assert_eq!(spec.buffer_dims(32), (8, 8));
    }

    #[test]
    fn test_shared_camera_view() {
        let camera = SharedCamera::new((100.0, 200.0), 512.0, 256.0, 2.0);
        let view = camera.world_view();
        assert_eq!(view.center(), (100.0, 200.0));
        assert_eq!(view.width(), 256.0);
        assert_eq!(view.height(), 128.0);

        camera.pan_by(-50.0, 10.0);
        assert_eq!(camera.center(), (50.0, 210.0));
    }
}
