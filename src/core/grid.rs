use serde::{Deserialize, Serialize};

/// A renderable tile variant. Non-negative values name a tile in the atlas;
/// [`EMPTY_TILE`] marks an absent cell.
pub type TileIndex = i32;

/// Sentinel for "no tile here".
pub const EMPTY_TILE: TileIndex = -1;

/// A world tile cell. The world is unbounded; coordinates are free signed
/// integers. Pixel positions always derive from `coord * TILE_SIZE`, never
/// the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldCoord {
    pub x: i32,
    pub y: i32,
}

impl WorldCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The cell containing the given world pixel.
    pub fn from_pixel(px: f64, py: f64, tile_size: u32) -> Self {
        let t = f64::from(tile_size);
        Self::new((px / t).floor() as i32, (py / t).floor() as i32)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// The 4-neighborhood of this cell.
    pub fn neighbors4(&self) -> [WorldCoord; 4] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
        ]
    }
}

/// A fixed-size, row-major grid of tile indices, as returned by window
/// reads and blitted into viewport buffers. Cell `(x, y)` of a grid with
/// anchor `(X0, Y0)` represents world tile `(X0 + x, Y0 + y)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    width: u32,
    height: u32,
    cells: Vec<TileIndex>,
}

impl TileGrid {
    /// Create a grid with every cell empty.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![EMPTY_TILE; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read a cell. Out-of-range coordinates read as empty.
    pub fn get(&self, x: u32, y: u32) -> TileIndex {
        if x >= self.width || y >= self.height {
            return EMPTY_TILE;
        }
        self.cells[(y * self.width + x) as usize]
    }

    /// Write a cell. Out-of-range coordinates are a no-op.
    pub fn set(&mut self, x: u32, y: u32, index: TileIndex) {
        if x < self.width && y < self.height {
            self.cells[(y * self.width + x) as usize] = index;
        }
    }

    /// True when no cell holds a tile.
    pub fn is_all_empty(&self) -> bool {
        self.cells.iter().all(|c| *c == EMPTY_TILE)
    }

    /// Number of non-empty cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| **c != EMPTY_TILE).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_from_pixel() {
        assert_eq!(WorldCoord::from_pixel(0.0, 0.0, 32), WorldCoord::new(0, 0));
        assert_eq!(WorldCoord::from_pixel(31.9, 31.9, 32), WorldCoord::new(0, 0));
        assert_eq!(WorldCoord::from_pixel(32.0, 64.0, 32), WorldCoord::new(1, 2));
        // Negative pixels floor toward negative infinity
        assert_eq!(
            WorldCoord::from_pixel(-0.5, -32.5, 32),
            WorldCoord::new(-1, -2)
        );
    }

    #[test]
    fn test_grid_roundtrip() {
        let mut grid = TileGrid::empty(4, 3);
        assert!(grid.is_all_empty());

        grid.set(2, 1, 7);
        assert_eq!(grid.get(2, 1), 7);
        assert_eq!(grid.occupied(), 1);

        // Out-of-range access is lenient
        assert_eq!(grid.get(4, 0), EMPTY_TILE);
        grid.set(9, 9, 3);
        assert_eq!(grid.occupied(), 1);
    }
}
