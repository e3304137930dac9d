//! Sparse world tile map and its persisted representation.
//!
//! One `WorldMap` exists per level. In memory it is a plain hash map from
//! world coordinate to tile index; on disk each entry packs its coordinate
//! into a 32-bit key, 16 bits per axis in two's complement.

use crate::core::grid::{TileGrid, TileIndex, WorldCoord, EMPTY_TILE};
use crate::prelude::HashMap;
use serde::{Deserialize, Serialize};

/// Pack a world coordinate into the persisted 32-bit key.
///
/// Each axis is truncated to 16 bits, which bounds a single level to the
/// signed 16-bit coordinate range. The in-memory map is not limited.
pub fn pack_coord(coord: WorldCoord) -> u32 {
    let x = coord.x as u16;
    let y = coord.y as u16;
    (u32::from(y) << 16) | u32::from(x)
}

/// Inverse of [`pack_coord`].
pub fn unpack_coord(key: u32) -> WorldCoord {
    let x = (key & 0xffff) as u16 as i16;
    let y = (key >> 16) as u16 as i16;
    WorldCoord::new(i32::from(x), i32::from(y))
}

/// One persisted tile entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    pub key: u32,
    pub index: TileIndex,
}

/// Persisted shape of one level: `levels[levelIndex] = { tiles: [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelObject {
    pub tiles: Vec<TileRecord>,
}

/// Sparse tile storage for a single level.
#[derive(Debug, Clone, Default)]
pub struct WorldMap {
    tiles: HashMap<WorldCoord, TileIndex>,
}

impl WorldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: WorldCoord) -> Option<TileIndex> {
        self.tiles.get(&coord).copied()
    }

    /// Write a cell. Setting [`EMPTY_TILE`] removes the entry so the map
    /// stays sparse.
    pub fn set(&mut self, coord: WorldCoord, index: TileIndex) {
        if index == EMPTY_TILE {
            self.tiles.remove(&coord);
        } else {
            self.tiles.insert(coord, index);
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Read a rectangular window anchored at `(offset_x, offset_y)`.
    /// Cells absent from the map read as empty.
    pub fn window(&self, width: u32, height: u32, offset_x: i32, offset_y: i32) -> TileGrid {
        let mut grid = TileGrid::empty(width, height);
        for y in 0..height {
            for x in 0..width {
                let coord = WorldCoord::new(offset_x + x as i32, offset_y + y as i32);
                if let Some(index) = self.get(coord) {
                    grid.set(x, y, index);
                }
            }
        }
        grid
    }

    pub fn to_records(&self) -> LevelObject {
        let mut tiles: Vec<TileRecord> = self
            .tiles
            .iter()
            .map(|(coord, index)| TileRecord {
                key: pack_coord(*coord),
                index: *index,
            })
            .collect();
        // Deterministic file contents regardless of hash order.
        tiles.sort_by_key(|r| r.key);
        LevelObject { tiles }
    }

    pub fn from_records(object: LevelObject) -> Self {
        let mut map = Self::new();
        for record in object.tiles {
            map.set(unpack_coord(record.key), record.index);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip() {
        for coord in [
            WorldCoord::new(0, 0),
            WorldCoord::new(1, 2),
            WorldCoord::new(-1, -2),
            WorldCoord::new(32767, -32768),
            WorldCoord::new(-32768, 32767),
        ] {
            assert_eq!(unpack_coord(pack_coord(coord)), coord);
        }
    }

    #[test]
    fn test_sparse_set_and_erase() {
        let mut map = WorldMap::new();
        map.set(WorldCoord::new(3, -4), 5);
        assert_eq!(map.get(WorldCoord::new(3, -4)), Some(5));
        assert_eq!(map.len(), 1);

        map.set(WorldCoord::new(3, -4), EMPTY_TILE);
        assert_eq!(map.get(WorldCoord::new(3, -4)), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_window_matches_point_reads() {
        let mut map = WorldMap::new();
        map.set(WorldCoord::new(-2, -2), 1);
        map.set(WorldCoord::new(0, 0), 2);
        map.set(WorldCoord::new(1, 1), 3);
        // Outside the window below
        map.set(WorldCoord::new(10, 10), 4);

        let grid = map.window(4, 4, -2, -2);
        for y in 0..4u32 {
            for x in 0..4u32 {
                let coord = WorldCoord::new(-2 + x as i32, -2 + y as i32);
                let expected = map.get(coord).unwrap_or(EMPTY_TILE);
                assert_eq!(grid.get(x, y), expected, "mismatch at {coord:?}");
            }
        }
        assert_eq!(grid.occupied(), 3);
    }

    #[test]
    fn test_records_roundtrip() {
        let mut map = WorldMap::new();
        map.set(WorldCoord::new(5, 6), 1);
        map.set(WorldCoord::new(-5, -6), 2);

        let restored = WorldMap::from_records(map.to_records());
        assert_eq!(restored.get(WorldCoord::new(5, 6)), Some(1));
        assert_eq!(restored.get(WorldCoord::new(-5, -6)), Some(2));
        assert_eq!(restored.len(), 2);
    }
}
