//! The tile database interface
//!
//! A [`TileSource`] answers header queries and turns a [`TileKey`] into a
//! detached scene [`Subtree`]. Everything format specific (binary parsing,
//! textures, materials, coordinate systems) lives behind this trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{DVec2, DVec3};
use crate::scene::Subtree;

use super::key::TileKey;

/// Per-level layout of the database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodInfo {
    /// Edge lengths of one tile (one paging cell) in world units.
    pub tile_size: DVec2,
    /// Distance at which this level starts to be needed.
    pub range: f64,
    /// Number of tiles along x and y.
    pub grid: glam::IVec2,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseHeader {
    /// South-west corner of the database extents. Paging positions are
    /// taken relative to this point.
    pub origin: DVec2,
    /// Levels from coarsest (index 0) to finest.
    pub lods: Vec<LodInfo>,
}

impl DatabaseHeader {
    pub fn num_lods(&self) -> usize {
        self.lods.len()
    }

    pub fn lod(&self, lod: i32) -> Option<&LodInfo> {
        usize::try_from(lod).ok().and_then(|i| self.lods.get(i))
    }

    /// North-east corner of the level 0 grid.
    pub fn extents_max(&self) -> DVec2 {
        self.lods
            .first()
            .map(|l| self.origin + l.tile_size * l.grid.as_dvec2())
            .unwrap_or(self.origin)
    }

    /// Whether `key` addresses a cell inside its level's grid.
    pub fn contains(&self, key: TileKey) -> bool {
        self.lod(key.lod).is_some_and(|l| {
            key.x >= 0 && key.y >= 0 && key.x < l.grid.x && key.y < l.grid.y
        })
    }
}

/// Bounding sphere and visibility ranges of a tile.
///
/// The tile's own (coarse) content is meant for viewers at least
/// `min_range` away; closer than that its children take over.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    pub center: DVec3,
    pub radius: f64,
    pub min_range: f64,
    pub max_range: f64,
}

/// Everything a source produces for one tile.
#[derive(Clone, Debug)]
pub struct TileContent {
    pub subtree: Subtree,
    /// Finer tiles this tile refines into, discovered while parsing it.
    pub children: Vec<TileKey>,
    pub bounds: TileBounds,
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("tile {key} unavailable: {reason}")]
pub struct TileUnavailable {
    pub key: TileKey,
    pub reason: String,
}

impl TileUnavailable {
    pub fn new(key: TileKey, reason: impl Into<String>) -> Self {
        Self { key, reason: reason.into() }
    }
}

/// A tiled terrain database.
///
/// `load_tile` is called from the background loader thread and may block on
/// I/O for as long as it needs.
pub trait TileSource: Send + Sync {
    fn header(&self) -> &DatabaseHeader;

    /// Whether the database holds a tile for `key`.
    fn has_tile(&self, key: TileKey) -> bool {
        self.header().contains(key)
    }

    fn load_tile(&self, key: TileKey) -> Result<TileContent, TileUnavailable>;
}
