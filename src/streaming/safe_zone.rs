//! The SafeZone: a pixel rectangle centered on the active buffer inside
//! which the camera can move without any streaming work.

use crate::core::bounds::PixelBounds;

/// Compute the SafeZone for an active buffer extent: same center, a fixed
/// fraction of the extent per axis.
pub fn compute(buffer_bounds: &PixelBounds, ratio: f64) -> PixelBounds {
    let (cx, cy) = buffer_bounds.center();
    PixelBounds::from_center_and_size(
        cx,
        cy,
        buffer_bounds.width() * ratio,
        buffer_bounds.height() * ratio,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_zone_geometry() {
        let buffer = PixelBounds::new(-256.0, -256.0, 256.0, 256.0);
        let zone = compute(&buffer, 0.4);

        assert_eq!(zone.center(), buffer.center());
        assert!((zone.width() - 204.8).abs() < 1e-9);
        assert!((zone.height() - 204.8).abs() < 1e-9);

        assert!(zone.contains(0.0, 0.0));
        assert!(zone.contains(102.0, -102.0));
        assert!(!zone.contains(103.0, 0.0));
    }
}
