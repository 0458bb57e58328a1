//! Tile addressing

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of one tile: grid cell `(x, y)` within level of detail `lod`.
///
/// Level 0 is the coarsest level. Keys order by lod, then x, then y, which
/// is the order the field declarations give the derived `Ord`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub lod: i32,
    pub x: i32,
    pub y: i32,
}

impl TileKey {
    pub const fn new(x: i32, y: i32, lod: i32) -> Self {
        Self { lod, x, y }
    }

    /// Same-level tile offset by `(dx, dy)` cells.
    pub const fn neighbour(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.lod)
    }

    /// Edge neighbours in north, east, south, west order.
    pub const fn neighbours(self) -> [TileKey; 4] {
        [
            self.neighbour(0, 1),
            self.neighbour(1, 0),
            self.neighbour(0, -1),
            self.neighbour(-1, 0),
        ]
    }

    /// The four next-level tiles covering this tile in a power-of-two pyramid.
    pub const fn quadtree_children(self) -> [TileKey; 4] {
        let (x, y, lod) = (self.x * 2, self.y * 2, self.lod + 1);
        [
            Self::new(x, y, lod),
            Self::new(x + 1, y, lod),
            Self::new(x, y + 1, lod),
            Self::new(x + 1, y + 1, lod),
        ]
    }

    /// Inverse of [`TileKey::quadtree_children`]; `None` at level 0.
    pub fn quadtree_parent(self) -> Option<TileKey> {
        (self.lod > 0).then(|| Self::new(self.x.div_euclid(2), self.y.div_euclid(2), self.lod - 1))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, lod {})", self.x, self.y, self.lod)
    }
}
