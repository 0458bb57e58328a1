//! Seam nodes
//!
//! A seam covers the shared edge between its owning tile and a neighbour at
//! the same level. The coarse child matches the owner's edge; the fine child
//! matches the neighbour's refined edge and is only safe to draw while the
//! neighbour really is drawn refined.

use crate::core::types::DVec3;

use super::graph::SceneGraph;
use super::lazy_tile::ExpansionState;
use super::node::{SceneNodeId, SeamSpec};
use super::tile_mapper::TileMapper;

#[derive(Clone, Debug)]
pub struct SeamNode {
    pub spec: SeamSpec,
    coarse: SceneNodeId,
    fine: Option<SceneNodeId>,
}

impl SeamNode {
    pub fn new(spec: SeamSpec, coarse: SceneNodeId, fine: Option<SceneNodeId>) -> Self {
        Self { spec, coarse, fine }
    }

    pub fn coarse(&self) -> SceneNodeId {
        self.coarse
    }

    pub fn fine(&self) -> Option<SceneNodeId> {
        self.fine
    }

    /// Whether the fine stitching is consistent with what the neighbour shows.
    ///
    /// Any neighbour that cannot be resolved in the live graph means coarse.
    pub fn uses_fine(&self, graph: &SceneGraph, eye: DVec3, mapper: Option<&TileMapper>) -> bool {
        if self.fine.is_none() || eye.distance(self.spec.center) >= self.spec.range {
            return false;
        }

        let Some((neighbour_id, neighbour)) = graph.lazy_tile(self.spec.neighbour) else {
            return false;
        };
        if neighbour.state() != ExpansionState::Expanded
            || eye.distance(neighbour.bounds.center) >= neighbour.bounds.min_range
        {
            return false;
        }

        match mapper {
            Some(mapper) => {
                let (dx, dy) = self.spec.direction();
                !mapper.is_node_blacklisted(neighbour_id)
                    && !mapper.is_tile_neighbour_a_lower_lod_level(self.spec.owner, dx, dy)
            }
            None => true,
        }
    }

    pub fn select(&self, graph: &SceneGraph, eye: DVec3, mapper: Option<&TileMapper>) -> &SceneNodeId {
        match &self.fine {
            Some(fine) if self.uses_fine(graph, eye, mapper) => fine,
            _ => &self.coarse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MergeOutcome, NodeContent};
    use crate::tile::{GridDatabaseConfig, GridTileSource, TileKey, TileSource};

    fn merge(graph: &mut SceneGraph, source: &GridTileSource, key: TileKey) {
        let content = source.load_tile(key).unwrap();
        if let MergeOutcome::Root(id) = graph.merge_tile(key, key.quadtree_parent(), content) {
            graph.attach(id, graph.root());
        }
    }

    fn east_seam(graph: &SceneGraph, owner: TileKey) -> SeamNode {
        let (_, lazy) = graph.lazy_tile(owner).unwrap();
        graph
            .children(lazy.coarse())
            .find_map(|id| match &graph.get(id).unwrap().content {
                NodeContent::Seam(seam) if seam.spec.direction() == (1, 0) => Some(seam.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_seam_follows_neighbour_expansion() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let mut graph = SceneGraph::new();
        let owner = TileKey::new(0, 0, 0);
        let neighbour = TileKey::new(1, 0, 0);
        merge(&mut graph, &source, owner);
        merge(&mut graph, &source, neighbour);

        let seam = east_seam(&graph, owner);
        let eye = DVec3::new(105.0, 50.0, 5.0);
        assert_eq!(seam.spec.neighbour, neighbour);
        assert!(!seam.uses_fine(&graph, eye, None));

        for child in neighbour.quadtree_children() {
            merge(&mut graph, &source, child);
        }
        assert!(seam.uses_fine(&graph, eye, None));
        assert_eq!(Some(*seam.select(&graph, eye, None)), seam.fine());

        // out of the seam's fine range
        let far = DVec3::new(105.0, 400.0, 5.0);
        assert_eq!(*seam.select(&graph, far, None), seam.coarse());

        // neighbour gone from the live graph
        graph.unhook_tile(neighbour);
        assert_eq!(*seam.select(&graph, eye, None), seam.coarse());
    }

    #[test]
    fn test_seam_defers_to_mapper() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let mut graph = SceneGraph::new();
        let owner = TileKey::new(0, 1, 0);
        let neighbour = TileKey::new(1, 1, 0);
        for x in 0..3 {
            for y in 0..3 {
                merge(&mut graph, &source, TileKey::new(x, y, 0));
            }
        }
        for child in neighbour.quadtree_children() {
            merge(&mut graph, &source, child);
        }

        let seam = east_seam(&graph, owner);
        let eye = DVec3::new(105.0, 150.0, 5.0);

        // owner never drawn in this mapper's frame, so its level is unknown
        let empty = TileMapper::new();
        assert!(!seam.uses_fine(&graph, eye, Some(&empty)));

        let mapper = TileMapper::for_frame(&graph, eye, None);
        assert!(mapper.is_tile_drawn(owner));
        assert_eq!(mapper.blacklist_len(), 0);
        assert!(seam.uses_fine(&graph, eye, Some(&mapper)));
    }
}
