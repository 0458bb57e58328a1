//! Tile visibility mapper
//!
//! Records which tiles a traversal actually drew geometry for, and at which
//! depth of the tile hierarchy, then removes refinements whose parent has no
//! drawn neighbour on the side they lean toward. Tiles whose
//! refinement was withdrawn are blacklisted so the draw traversal keeps them
//! coarse for the rest of the frame.

use std::collections::{BTreeMap, HashSet};

use crate::core::types::DVec3;
use crate::math::Frustum;
use crate::tile::TileKey;

use super::graph::SceneGraph;
use super::node::{NodeContent, SceneNode, SceneNodeId};
use super::traversal::{CullContext, SceneVisitor};

/// One lazy tile on the path from the coarsest drawn ancestor down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StackEntry {
    pub key: TileKey,
    pub node: SceneNodeId,
    pub center: DVec3,
}

/// Ancestor chain of a drawn tile, coarsest first, the tile itself last.
pub type TileStack = Vec<StackEntry>;

#[derive(Clone, Debug, Default)]
pub struct TileMapper {
    stack: TileStack,
    contains_geometry: bool,
    tile_map: BTreeMap<TileKey, TileStack>,
    blacklist: HashSet<SceneNodeId>,
}

impl TileMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map and audit one frame: traverse without advisory state, then
    /// settle the visible set.
    pub fn for_frame(graph: &SceneGraph, eye: DVec3, frustum: Option<&Frustum>) -> Self {
        let mut mapper = Self::new();
        let ctx = CullContext { eye, frustum, mapper: None };
        graph.traverse(&ctx, &mut mapper);
        mapper.check_validity_of_all_visible_tiles();
        mapper
    }

    /// Forget the previous frame.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.contains_geometry = false;
        self.tile_map.clear();
        self.blacklist.clear();
    }

    /// Record `stack` as drawn for its last entry's tile.
    pub fn insert_tile(&mut self, stack: TileStack) {
        if let Some(last) = stack.last() {
            self.tile_map.insert(last.key, stack);
        }
    }

    pub fn tile_map(&self) -> &BTreeMap<TileKey, TileStack> {
        &self.tile_map
    }

    pub fn is_tile_drawn(&self, key: TileKey) -> bool {
        self.tile_map.contains_key(&key)
    }

    pub fn is_node_blacklisted(&self, node: SceneNodeId) -> bool {
        self.blacklist.contains(&node)
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    /// Replace over-refined tiles by their parents until nothing changes.
    ///
    /// A tile is over-refined when its parent is missing a same-level
    /// neighbour on a side the tile leans toward inside it. A neighbour
    /// counts as present when it, or any tile under it, is in the map; an
    /// undrawn or coarser region across the edge makes the tile invalid.
    /// Each replacement can expose new violations, so the pass repeats to a
    /// fixed point. Returns the number of tiles removed.
    pub fn check_validity_of_all_visible_tiles(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let invalid: Vec<TileKey> = self
                .tile_map
                .iter()
                .filter(|(_, stack)| !self.is_stack_valid(stack))
                .map(|(key, _)| *key)
                .collect();
            if invalid.is_empty() {
                break;
            }

            for key in invalid {
                let Some(mut stack) = self.tile_map.remove(&key) else {
                    continue;
                };
                stack.pop();
                if let Some(parent) = stack.last() {
                    log::trace!("tile {key} over-refined, drawing {} instead", parent.key);
                    self.blacklist.insert(parent.node);
                    self.tile_map.insert(parent.key, stack);
                }
                removed += 1;
            }
        }
        removed
    }

    fn is_stack_valid(&self, stack: &[StackEntry]) -> bool {
        let [.., parent, tile] = stack else {
            return true;
        };
        let (sx, sy) = lean(tile.center - parent.center);
        self.is_region_drawn(parent.key.neighbour(sx, 0))
            && self.is_region_drawn(parent.key.neighbour(0, sy))
    }

    /// Whether `key`, or some finer tile inside it, is in the map.
    fn is_region_drawn(&self, key: TileKey) -> bool {
        if self.tile_map.contains_key(&key) {
            return true;
        }
        let Some(finest) = self.tile_map.keys().next_back().map(|k| k.lod) else {
            return false;
        };
        for lod in key.lod + 1..=finest {
            let Some(span) = 1i32.checked_shl((lod - key.lod) as u32).filter(|s| *s > 0) else {
                break;
            };
            let (Some(x0), Some(y0)) = (key.x.checked_mul(span), key.y.checked_mul(span)) else {
                break;
            };
            let first = TileKey::new(x0, y0, lod);
            let past = TileKey::new(x0.saturating_add(span), y0, lod);
            let y_end = y0.saturating_add(span);
            if self.tile_map.range(first..past).any(|(k, _)| k.y >= y0 && k.y < y_end) {
                return true;
            }
        }
        false
    }

    /// Whether the region across the `(dx, dy)` edge of `key` renders at a
    /// coarser level than `key`.
    ///
    /// A region drawn at the same or a finer level answers `false`. Anything
    /// else, including nothing drawn there or `key` itself never drawn this
    /// frame, answers `true`, which keeps seams coarse.
    pub fn is_tile_neighbour_a_lower_lod_level(&self, key: TileKey, dx: i32, dy: i32) -> bool {
        if self.is_region_drawn(key.neighbour(dx, dy)) {
            return false;
        }
        if !self.tile_map.contains_key(&key) {
            log::debug!("neighbour query for tile {key} which was not drawn");
        }
        true
    }
}

fn lean(offset: DVec3) -> (i32, i32) {
    (
        if offset.x >= 0.0 { 1 } else { -1 },
        if offset.y >= 0.0 { 1 } else { -1 },
    )
}

impl SceneVisitor for TileMapper {
    fn enter(&mut self, _graph: &SceneGraph, node: &SceneNode) -> bool {
        match &node.content {
            NodeContent::LazyTile(lazy) => {
                self.stack.push(StackEntry {
                    key: lazy.key,
                    node: node.id,
                    center: lazy.bounds.center,
                });
                self.contains_geometry = false;
            }
            NodeContent::Drawable(_) => self.contains_geometry = true,
            NodeContent::Group | NodeContent::Seam(_) => {}
        }
        true
    }

    fn leave(&mut self, _graph: &SceneGraph, node: &SceneNode) {
        if let NodeContent::LazyTile(_) = node.content {
            if self.contains_geometry {
                self.insert_tile(self.stack.clone());
            }
            self.stack.pop();
            self.contains_geometry = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(x: i32, y: i32, lod: i32) -> StackEntry {
        let size = 400.0 / f64::from(1 << lod);
        StackEntry {
            key: TileKey::new(x, y, lod),
            node: SceneNodeId(((lod as u64) << 32) | ((x as u64) << 16) | y as u64),
            center: DVec3::new((x as f64 + 0.5) * size, (y as f64 + 0.5) * size, 0.0),
        }
    }

    fn chain(keys: &[(i32, i32, i32)]) -> TileStack {
        keys.iter().map(|&(x, y, lod)| entry(x, y, lod)).collect()
    }

    /// Level-0 tiles of the 3x3 block around (1,1,0), drawn coarse, without
    /// (1,1,0) itself.
    fn ring() -> TileMapper {
        let mut mapper = TileMapper::new();
        for x in 0..3 {
            for y in 0..3 {
                if (x, y) != (1, 1) {
                    mapper.insert_tile(chain(&[(x, y, 0)]));
                }
            }
        }
        mapper
    }

    #[test]
    fn test_one_level_difference_is_valid() {
        let mut mapper = ring();
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            mapper.insert_tile(chain(&[(1, 1, 0), (x, y, 1)]));
        }

        assert_eq!(mapper.check_validity_of_all_visible_tiles(), 0);
        assert_eq!(mapper.blacklist_len(), 0);
    }

    #[test]
    fn test_two_level_difference_is_repaired() {
        let mut mapper = ring();
        for (x, y) in [(2, 2), (2, 3), (3, 3)] {
            mapper.insert_tile(chain(&[(1, 1, 0), (x, y, 1)]));
        }
        // (7,4,2) leans east inside (3,2,1); east of (3,2,1) only level 0 is drawn
        mapper.insert_tile(chain(&[(1, 1, 0), (3, 2, 1), (7, 4, 2)]));

        let removed = mapper.check_validity_of_all_visible_tiles();
        assert_eq!(removed, 1);
        assert!(!mapper.is_tile_drawn(TileKey::new(7, 4, 2)));
        assert!(mapper.is_tile_drawn(TileKey::new(3, 2, 1)));
        assert!(mapper.is_node_blacklisted(entry(3, 2, 1).node));
        assert_eq!(mapper.tile_map()[&TileKey::new(3, 2, 1)].len(), 2);
    }

    #[test]
    fn test_missing_parent_neighbour_demotes() {
        let mut mapper = TileMapper::new();
        // nothing is drawn east of (1,0,1) or of (0,0,0)
        mapper.insert_tile(chain(&[(0, 0, 0), (1, 0, 1), (3, 0, 2)]));

        let removed = mapper.check_validity_of_all_visible_tiles();
        assert_eq!(removed, 2);
        assert!(!mapper.is_tile_drawn(TileKey::new(3, 0, 2)));
        assert!(!mapper.is_tile_drawn(TileKey::new(1, 0, 1)));
        assert!(mapper.is_tile_drawn(TileKey::new(0, 0, 0)));
        assert!(mapper.is_node_blacklisted(entry(0, 0, 0).node));
    }

    #[test]
    fn test_tile_next_to_drawn_or_finer_neighbours_is_kept() {
        let mut mapper = ring();
        mapper.insert_tile(chain(&[(1, 1, 0), (2, 3, 1)]));
        mapper.insert_tile(chain(&[(1, 1, 0), (3, 3, 1)]));
        // (2,2,1) is itself refined; (5,5,2) borders (3,2,1) from the west
        mapper.insert_tile(chain(&[(1, 1, 0), (2, 2, 1), (5, 5, 2)]));
        // (6,5,2) leans west and north, where (2,2,1) and (3,3,1) are drawn
        mapper.insert_tile(chain(&[(1, 1, 0), (3, 2, 1), (6, 5, 2)]));

        assert_eq!(mapper.check_validity_of_all_visible_tiles(), 0);
        assert!(mapper.is_tile_drawn(TileKey::new(6, 5, 2)));
        assert!(mapper.is_tile_drawn(TileKey::new(5, 5, 2)));
    }

    #[test]
    fn test_fixed_point_cascades() {
        let mut mapper = ring();
        for (x, y) in [(2, 2), (2, 3), (3, 3)] {
            mapper.insert_tile(chain(&[(1, 1, 0), (x, y, 1)]));
        }
        mapper.insert_tile(chain(&[(1, 1, 0), (3, 2, 1), (7, 4, 2), (15, 8, 3)]));

        let removed = mapper.check_validity_of_all_visible_tiles();
        assert_eq!(removed, 2);
        assert!(mapper.is_tile_drawn(TileKey::new(3, 2, 1)));
        assert!(!mapper.is_tile_drawn(TileKey::new(7, 4, 2)));
        assert!(!mapper.is_tile_drawn(TileKey::new(15, 8, 3)));
        assert!(mapper.is_node_blacklisted(entry(7, 4, 2).node));
        assert!(mapper.is_node_blacklisted(entry(3, 2, 1).node));

        // every surviving tile satisfies the invariant
        for stack in mapper.tile_map().values() {
            assert!(mapper.is_stack_valid(stack));
        }
    }

    #[test]
    fn test_neighbour_lod_query() {
        let mut mapper = ring();
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            mapper.insert_tile(chain(&[(1, 1, 0), (x, y, 1)]));
        }

        // across the east edge of (3,2,1) only level 0 is drawn
        assert!(mapper.is_tile_neighbour_a_lower_lod_level(TileKey::new(3, 2, 1), 1, 0));
        // north and west of (3,2,1) are drawn at the same level
        assert!(!mapper.is_tile_neighbour_a_lower_lod_level(TileKey::new(3, 2, 1), 0, 1));
        assert!(!mapper.is_tile_neighbour_a_lower_lod_level(TileKey::new(3, 2, 1), -1, 0));
        // a finer region counts as not lower
        assert!(!mapper.is_tile_neighbour_a_lower_lod_level(TileKey::new(0, 1, 0), 1, 0));
        // nothing drawn across the edge
        assert!(mapper.is_tile_neighbour_a_lower_lod_level(TileKey::new(2, 2, 0), 1, 0));
        // unknown tile
        assert!(mapper.is_tile_neighbour_a_lower_lod_level(TileKey::new(5, 5, 1), 1, 0));
    }

    #[test]
    fn test_reset_clears_frame() {
        let mut mapper = TileMapper::new();
        mapper.insert_tile(chain(&[(0, 0, 0), (1, 0, 1), (3, 1, 2)]));
        mapper.check_validity_of_all_visible_tiles();
        mapper.reset();
        assert!(mapper.tile_map().is_empty());
        assert_eq!(mapper.blacklist_len(), 0);
    }
}
