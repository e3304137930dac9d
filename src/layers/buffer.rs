//! The viewport buffer layer primitive.
//!
//! Two of these form the streaming engine's double buffer. The layer owns a
//! fixed-size tile grid, a pixel position and a visibility flag; the engine
//! decides which instance is active and where both sit in the world.

use crate::core::{
    bounds::PixelBounds,
    grid::{TileGrid, TileIndex, EMPTY_TILE},
};

/// A fixed-size grid of tiles positioned somewhere in world pixel space.
#[derive(Debug, Clone)]
pub struct BufferLayer {
    grid: TileGrid,
    tile_size: u32,
    position: (f64, f64),
    visible: bool,
}

impl BufferLayer {
    /// Create a hidden, empty buffer at the world origin.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            grid: TileGrid::empty(width, height),
            tile_size,
            position: (0.0, 0.0),
            visible: false,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Move the layer so its top-left cell starts at the given world pixel.
    pub fn set_position(&mut self, px: f64, py: f64) {
        self.position = (px, py);
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid.width(), self.grid.height())
    }

    /// Replace the whole tile grid. Grids of the wrong size are rejected by
    /// the caller; the blit itself is unconditional.
    pub fn put_tiles_at(&mut self, grid: TileGrid) {
        self.grid = grid;
    }

    /// Read cell `(i, j)`. Out-of-range cells read as empty.
    pub fn get_tile_at(&self, i: u32, j: u32) -> TileIndex {
        self.grid.get(i, j)
    }

    /// Write cell `(i, j)`. Out-of-range writes are a no-op.
    pub fn put_tile_at(&mut self, index: TileIndex, i: u32, j: u32) {
        self.grid.set(i, j, index);
    }

    /// True when cell `(i, j)` holds a tile.
    pub fn has_tile_at(&self, i: u32, j: u32) -> bool {
        self.grid.get(i, j) != EMPTY_TILE
    }

    /// The layer's world pixel extent at its current position.
    pub fn bounds(&self) -> PixelBounds {
        let w = f64::from(self.grid.width() * self.tile_size);
        let h = f64::from(self.grid.height() * self.tile_size);
        PixelBounds::new(
            self.position.0,
            self.position.1,
            self.position.0 + w,
            self.position.1 + h,
        )
    }

    /// Convert a world pixel to a cell of this layer.
    ///
    /// Returns `None` iff the pixel lies outside the layer's pixel extent.
    pub fn world_to_tile_xy(&self, px: f64, py: f64) -> Option<(u32, u32)> {
        let t = f64::from(self.tile_size);
        let i = ((px - self.position.0) / t).floor();
        let j = ((py - self.position.1) / t).floor();
        if i < 0.0
            || j < 0.0
            || i >= f64::from(self.grid.width())
            || j >= f64::from(self.grid.height())
        {
            return None;
        }
        Some((i as u32, j as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_tile_xy() {
        let mut layer = BufferLayer::new(16, 16, 32);
        layer.set_position(-256.0, -256.0);

        assert_eq!(layer.world_to_tile_xy(-256.0, -256.0), Some((0, 0)));
        assert_eq!(layer.world_to_tile_xy(0.0, 0.0), Some((8, 8)));
        assert_eq!(layer.world_to_tile_xy(255.9, 255.9), Some((15, 15)));
        // One pixel right of the extent
        assert_eq!(layer.world_to_tile_xy(256.0, 0.0), None);
        assert_eq!(layer.world_to_tile_xy(-257.0, 0.0), None);
    }

    #[test]
    fn test_blit_and_cell_access() {
        let mut layer = BufferLayer::new(4, 4, 32);
        let mut grid = TileGrid::empty(4, 4);
        grid.set(1, 2, 9);
        layer.put_tiles_at(grid);

        assert_eq!(layer.get_tile_at(1, 2), 9);
        assert!(layer.has_tile_at(1, 2));
        assert!(!layer.has_tile_at(0, 0));

        layer.put_tile_at(3, 0, 0);
        assert_eq!(layer.get_tile_at(0, 0), 3);
    }

    #[test]
    fn test_bounds_follow_position() {
        let mut layer = BufferLayer::new(8, 4, 32);
        layer.set_position(64.0, -128.0);
        let b = layer.bounds();
        assert_eq!(b.left, 64.0);
        assert_eq!(b.top, -128.0);
        assert_eq!(b.width(), 256.0);
        assert_eq!(b.height(), 128.0);
    }
}
