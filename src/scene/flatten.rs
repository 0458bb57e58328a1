//! Flattened draw list.
//!
//! `FlatDrawable` is the result of walking the scene graph: one entry per
//! drawable the renderer should submit this frame.

use crate::core::types::DVec3;
use crate::math::{Aabb, Frustum};
use crate::tile::TileKey;

use super::graph::SceneGraph;
use super::node::{NodeContent, SceneNode, SceneNodeId};
use super::tile_mapper::TileMapper;
use super::traversal::{CullContext, SceneVisitor};

/// One entry in the flattened visible set.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatDrawable {
    pub node: SceneNodeId,
    /// Innermost tile the drawable belongs to, `None` for unpaged content.
    pub tile: Option<TileKey>,
    pub name: String,
    pub bounds: Aabb,
}

#[derive(Default)]
struct DrawListCollector {
    tiles: Vec<TileKey>,
    out: Vec<FlatDrawable>,
}

impl SceneVisitor for DrawListCollector {
    fn enter(&mut self, _graph: &SceneGraph, node: &SceneNode) -> bool {
        match &node.content {
            NodeContent::LazyTile(lazy) => self.tiles.push(lazy.key),
            NodeContent::Drawable(drawable) => self.out.push(FlatDrawable {
                node: node.id,
                tile: self.tiles.last().copied(),
                name: drawable.name.clone(),
                bounds: drawable.bounds,
            }),
            NodeContent::Group | NodeContent::Seam(_) => {}
        }
        true
    }

    fn leave(&mut self, _graph: &SceneGraph, node: &SceneNode) {
        if let NodeContent::LazyTile(_) = node.content {
            self.tiles.pop();
        }
    }
}

/// Everything the cull stage produces for one frame.
#[derive(Debug)]
pub struct FrameCull {
    pub mapper: TileMapper,
    pub drawables: Vec<FlatDrawable>,
}

impl SceneGraph {
    /// Collect the drawables selected for `ctx`.
    pub fn flatten(&self, ctx: &CullContext<'_>) -> Vec<FlatDrawable> {
        let mut collector = DrawListCollector::default();
        self.traverse(ctx, &mut collector);
        collector.out
    }

    /// Map the visible tiles, settle their levels, and build the draw list
    /// with the settled mapper as advisory state.
    pub fn cull_frame(&self, eye: DVec3, frustum: Option<&Frustum>) -> FrameCull {
        let mapper = TileMapper::for_frame(self, eye, frustum);
        let ctx = CullContext { eye, frustum, mapper: Some(&mapper) };
        let drawables = self.flatten(&ctx);
        FrameCull { mapper, drawables }
    }
}
