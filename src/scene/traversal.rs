//! Cull traversal
//!
//! Walks the graph the way a renderer would, entering only the child each
//! lazy tile and seam selects for the current eye point.

use crate::core::types::DVec3;
use crate::math::Frustum;

use super::graph::SceneGraph;
use super::node::{NodeContent, SceneNode, SceneNodeId};
use super::tile_mapper::TileMapper;

/// Per-frame inputs to child selection.
#[derive(Clone, Copy, Debug)]
pub struct CullContext<'a> {
    pub eye: DVec3,
    pub frustum: Option<&'a Frustum>,
    /// Visibility audit from this frame's mapper pass, when one was run.
    pub mapper: Option<&'a TileMapper>,
}

impl<'a> CullContext<'a> {
    pub fn new(eye: DVec3) -> Self {
        Self { eye, frustum: None, mapper: None }
    }

    pub fn with_frustum(mut self, frustum: &'a Frustum) -> Self {
        self.frustum = Some(frustum);
        self
    }

    pub fn with_mapper(mut self, mapper: &'a TileMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }
}

/// Callbacks for [`SceneGraph::traverse`].
pub trait SceneVisitor {
    /// Called before a node's selected children; return `false` to skip them.
    fn enter(&mut self, _graph: &SceneGraph, _node: &SceneNode) -> bool {
        true
    }

    /// Called after a node's selected children, only if `enter` ran.
    fn leave(&mut self, _graph: &SceneGraph, _node: &SceneNode) {}
}

impl SceneGraph {
    /// Depth-first walk from the root over the children selected for `ctx`.
    pub fn traverse<V: SceneVisitor>(&self, ctx: &CullContext<'_>, visitor: &mut V) {
        self.traverse_node(self.root(), ctx, visitor);
    }

    fn traverse_node<V: SceneVisitor>(&self, id: SceneNodeId, ctx: &CullContext<'_>, visitor: &mut V) {
        let Some(node) = self.get(id) else {
            return;
        };
        if !node.visible || self.is_culled(node, ctx) {
            return;
        }
        if !visitor.enter(self, node) {
            return;
        }
        for &child in self.selected_children(node, ctx) {
            self.traverse_node(child, ctx, visitor);
        }
        visitor.leave(self, node);
    }

    fn is_culled(&self, node: &SceneNode, ctx: &CullContext<'_>) -> bool {
        let Some(frustum) = ctx.frustum else {
            return false;
        };
        match &node.content {
            NodeContent::LazyTile(lazy) => {
                !frustum.intersects_sphere(lazy.bounds.center, lazy.bounds.radius)
            }
            NodeContent::Drawable(drawable) => !frustum.intersects_aabb(&drawable.bounds),
            NodeContent::Group | NodeContent::Seam(_) => false,
        }
    }

    /// Children a renderer would enter for `node` this frame.
    pub fn selected_children<'a>(&'a self, node: &'a SceneNode, ctx: &CullContext<'_>) -> &'a [SceneNodeId] {
        match &node.content {
            NodeContent::Group | NodeContent::Drawable(_) => &node.children,
            NodeContent::LazyTile(lazy) => {
                let blacklisted = ctx.mapper.is_some_and(|m| m.is_node_blacklisted(node.id));
                std::slice::from_ref(lazy.select(ctx.eye, blacklisted))
            }
            NodeContent::Seam(seam) => std::slice::from_ref(seam.select(self, ctx.eye, ctx.mapper)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DMat4;
    use crate::scene::MergeOutcome;
    use crate::tile::{GridDatabaseConfig, GridTileSource, TileKey, TileSource};

    /// Records every node name entered.
    #[derive(Default)]
    struct Recorder {
        entered: Vec<String>,
    }

    impl SceneVisitor for Recorder {
        fn enter(&mut self, _graph: &SceneGraph, node: &SceneNode) -> bool {
            self.entered.push(node.name.clone());
            true
        }
    }

    fn expanded_graph() -> SceneGraph {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let mut graph = SceneGraph::new();
        let parent = TileKey::new(0, 0, 0);
        for key in std::iter::once(parent).chain(parent.quadtree_children()) {
            let content = source.load_tile(key).unwrap();
            if let MergeOutcome::Root(id) = graph.merge_tile(key, key.quadtree_parent(), content) {
                graph.attach(id, graph.root());
            }
        }
        graph
    }

    #[test]
    fn test_far_eye_sees_coarse_only() {
        let graph = expanded_graph();
        let mut recorder = Recorder::default();
        graph.traverse(&CullContext::new(DVec3::new(900.0, 900.0, 50.0)), &mut recorder);

        assert!(recorder.entered.contains(&"tile_0_0_0".to_string()));
        assert!(!recorder.entered.iter().any(|n| n.starts_with("lazy_0_0_1")));
    }

    #[test]
    fn test_near_eye_sees_children() {
        let graph = expanded_graph();
        let mut recorder = Recorder::default();
        graph.traverse(&CullContext::new(DVec3::new(50.0, 50.0, 5.0)), &mut recorder);

        assert!(!recorder.entered.contains(&"tile_0_0_0".to_string()));
        for name in ["tile_0_0_1", "tile_1_0_1", "tile_0_1_1", "tile_1_1_1"] {
            assert!(recorder.entered.contains(&name.to_string()), "missing {name}");
        }
    }

    #[test]
    fn test_frustum_culls_tiles() {
        let graph = expanded_graph();
        // Looking straight down at a spot far away from tile (0, 0)
        let eye = DVec3::new(800.0, 800.0, 100.0);
        let proj = DMat4::orthographic_rh(-50.0, 50.0, -50.0, 50.0, 1.0, 500.0);
        let view = DMat4::look_at_rh(eye, DVec3::new(800.0, 800.0, 0.0), DVec3::Y);
        let frustum = Frustum::from_view_projection(&(proj * view));

        let mut recorder = Recorder::default();
        graph.traverse(&CullContext::new(eye).with_frustum(&frustum), &mut recorder);
        assert_eq!(recorder.entered, vec!["root".to_string()]);
    }

    #[test]
    fn test_hidden_nodes_are_skipped() {
        let mut graph = expanded_graph();
        let (id, _) = graph.lazy_tile(TileKey::new(0, 0, 0)).unwrap();
        graph.set_visible(id, false);

        let mut recorder = Recorder::default();
        graph.traverse(&CullContext::new(DVec3::ZERO), &mut recorder);
        assert_eq!(recorder.entered, vec!["root".to_string()]);
    }
}
