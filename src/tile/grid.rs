//! Synthetic power-of-two tile database
//!
//! Each level halves the tile size and the level range of the one above and
//! doubles its grid. Tile content is a flat ground drawable plus seams on the
//! east and north edges. Used by the page tester, benches, and tests.

use std::collections::HashSet;
use std::time::Duration;

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::core::types::{DVec2, DVec3};
use crate::math::Aabb;
use crate::scene::{Drawable, SeamSpec, Subtree};

use super::key::TileKey;
use super::source::{DatabaseHeader, LodInfo, TileBounds, TileContent, TileSource, TileUnavailable};

/// Layout of a [`GridTileSource`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDatabaseConfig {
    pub origin: DVec2,
    pub num_lods: u32,
    /// Tile edge length at level 0.
    pub base_tile_size: f64,
    /// Level 0 grid dimensions in tiles.
    pub base_grid: IVec2,
    /// Level 0 range; finer levels halve it.
    pub base_range: f64,
    /// Height of the ground slab, only used for bounds.
    pub height: f64,
    /// Tiles the database claims not to have.
    pub missing: Vec<TileKey>,
    /// Artificial per-tile load latency.
    pub load_delay_ms: u64,
}

impl Default for GridDatabaseConfig {
    fn default() -> Self {
        Self {
            origin: DVec2::ZERO,
            num_lods: 3,
            base_tile_size: 100.0,
            base_grid: IVec2::new(10, 10),
            base_range: 100.0,
            height: 10.0,
            missing: Vec::new(),
            load_delay_ms: 0,
        }
    }
}

/// In-memory database with a regular quadtree layout.
pub struct GridTileSource {
    header: DatabaseHeader,
    height: f64,
    missing: HashSet<TileKey>,
    load_delay: Duration,
}

impl GridTileSource {
    pub fn new(config: GridDatabaseConfig) -> Self {
        let lods: Vec<LodInfo> = (0..config.num_lods.max(1))
            .map_while(|lod| {
                let scale = 1i32.checked_shl(lod).filter(|s| *s > 0)?;
                let grid = IVec2::new(
                    config.base_grid.x.checked_mul(scale)?,
                    config.base_grid.y.checked_mul(scale)?,
                );
                let factor = f64::from(scale);
                Some(LodInfo {
                    tile_size: DVec2::splat(config.base_tile_size / factor),
                    range: config.base_range / factor,
                    grid,
                })
            })
            .collect();
        if lods.len() < config.num_lods as usize {
            log::warn!(
                "grid database truncated to {} levels, {} requested would overflow the tile grid",
                lods.len(),
                config.num_lods
            );
        }

        Self {
            header: DatabaseHeader { origin: config.origin, lods },
            height: config.height,
            missing: config.missing.into_iter().collect(),
            load_delay: Duration::from_millis(config.load_delay_ms),
        }
    }

    /// World-space box of a tile.
    pub fn tile_aabb(&self, key: TileKey) -> Option<Aabb> {
        let lod = self.header.lod(key.lod)?;
        let min = self.header.origin + lod.tile_size * DVec2::new(key.x as f64, key.y as f64);
        let max = min + lod.tile_size;
        Some(Aabb::new(min.extend(0.0), max.extend(self.height)))
    }

    /// Range below which a tile hands over to its children.
    fn handover_range(&self, lod: i32) -> f64 {
        self.header.lod(lod + 1).map_or(0.0, |finer| finer.range)
    }

    fn seam(&self, owner: TileKey, dx: i32, dy: i32, tile: &Aabb) -> Option<Subtree> {
        let neighbour = owner.neighbour(dx, dy);
        if !self.has_tile(neighbour) {
            return None;
        }

        let edge = if dx > 0 {
            Aabb::new(
                DVec3::new(tile.max.x, tile.min.y, tile.min.z),
                DVec3::new(tile.max.x, tile.max.y, tile.max.z),
            )
        } else {
            Aabb::new(
                DVec3::new(tile.min.x, tile.max.y, tile.min.z),
                DVec3::new(tile.max.x, tile.max.y, tile.max.z),
            )
        };
        let side = if dx > 0 { "east" } else { "north" };
        let fine = self.header.lod(owner.lod + 1).map(|_| {
            Box::new(Subtree::Drawable(Drawable::new(format!("seam_{side}_fine"), edge)))
        });

        Some(Subtree::Seam {
            spec: SeamSpec {
                owner,
                neighbour,
                center: edge.center(),
                range: self.handover_range(owner.lod),
            },
            coarse: Box::new(Subtree::Drawable(Drawable::new(format!("seam_{side}_coarse"), edge))),
            fine,
        })
    }
}

impl TileSource for GridTileSource {
    fn header(&self) -> &DatabaseHeader {
        &self.header
    }

    fn has_tile(&self, key: TileKey) -> bool {
        self.header.contains(key) && !self.missing.contains(&key)
    }

    fn load_tile(&self, key: TileKey) -> Result<TileContent, TileUnavailable> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if !self.has_tile(key) {
            return Err(TileUnavailable::new(key, "not in database"));
        }
        let aabb = self
            .tile_aabb(key)
            .ok_or_else(|| TileUnavailable::new(key, "level out of range"))?;

        let mut parts = vec![Subtree::Drawable(Drawable::new("ground", aabb))];
        parts.extend(self.seam(key, 1, 0, &aabb));
        parts.extend(self.seam(key, 0, 1, &aabb));

        let children = if self.header.lod(key.lod + 1).is_some() {
            key.quadtree_children()
                .into_iter()
                .filter(|c| self.has_tile(*c))
                .collect()
        } else {
            Vec::new()
        };

        let range = self.header.lod(key.lod).map_or(0.0, |l| l.range);
        Ok(TileContent {
            subtree: Subtree::group(format!("tile_{}_{}_{}", key.x, key.y, key.lod), parts),
            children,
            bounds: TileBounds {
                center: aabb.center(),
                radius: aabb.bounding_radius(),
                min_range: self.handover_range(key.lod),
                max_range: range * 4.0,
            },
        })
    }
}
