//! Scene graph: arena of nodes with parent/child links.
//!
//! Paged tiles enter through [`SceneGraph::merge_tile`] and leave through
//! [`SceneGraph::unhook_tile`]. A tile index maps every merged [`TileKey`] to
//! its lazy tile node so seams and merges can find tiles by key.

use std::collections::HashMap;

use crate::tile::{TileContent, TileKey};

use super::lazy_tile::LazyTile;
use super::node::{NodeContent, SceneNode, SceneNodeId, Subtree};
use super::seam::SeamNode;

/// Nodes removed from the graph, kept alive until they can be released.
#[derive(Debug)]
pub struct DetachedSubtree {
    pub key: TileKey,
    nodes: Vec<SceneNode>,
}

impl DetachedSubtree {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Result of merging a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A level-0 tile, left detached for the embedder to [`SceneGraph::attach`].
    Root(SceneNodeId),
    /// Merged under its parent's fine group.
    Child(SceneNodeId),
    /// The parent tile is not in the graph, or the tile is already merged;
    /// the new content was discarded.
    Dropped,
}

impl MergeOutcome {
    pub fn node(self) -> Option<SceneNodeId> {
        match self {
            MergeOutcome::Root(id) | MergeOutcome::Child(id) => Some(id),
            MergeOutcome::Dropped => None,
        }
    }
}

/// CPU-side scene graph holding paged terrain.
pub struct SceneGraph {
    nodes: HashMap<SceneNodeId, SceneNode>,
    root: SceneNodeId,
    next_id: u64,
    tile_index: HashMap<TileKey, SceneNodeId>,
}

impl SceneGraph {
    /// Create a new scene graph with a root Group node.
    pub fn new() -> Self {
        let root_id = SceneNodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(root_id, SceneNode::new(root_id, "root", NodeContent::Group));

        Self {
            nodes,
            root: root_id,
            next_id: 1,
            tile_index: HashMap::new(),
        }
    }

    pub fn root(&self) -> SceneNodeId {
        self.root
    }

    fn alloc_id(&mut self) -> SceneNodeId {
        let id = SceneNodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert_node(
        &mut self,
        parent: Option<SceneNodeId>,
        name: impl Into<String>,
        content: NodeContent,
    ) -> SceneNodeId {
        let id = self.alloc_id();
        let mut node = SceneNode::new(id, name, content);
        node.parent = parent;
        self.nodes.insert(id, node);

        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.push(id);
            }
        }
        id
    }

    /// Add a child node under `parent`. Returns the new node's ID.
    pub fn add_child(
        &mut self,
        parent: SceneNodeId,
        name: impl Into<String>,
        content: NodeContent,
    ) -> SceneNodeId {
        self.insert_node(Some(parent), name, content)
    }

    /// Hang a detached node (such as a new level-0 tile) under `parent`.
    ///
    /// Returns `false` if either node is unknown or `id` already has a parent.
    pub fn attach(&mut self, id: SceneNodeId, parent: SceneNodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(&parent) {
            return false;
        }
        match self.nodes.get_mut(&id) {
            Some(node) if node.parent.is_none() => node.parent = Some(parent),
            _ => return false,
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        true
    }

    /// Turn a detached subtree into arena nodes under `parent`.
    ///
    /// With `parent` set to `None` the new nodes stay detached. Returns the
    /// id of the subtree's root.
    pub fn graft(&mut self, parent: Option<SceneNodeId>, subtree: Subtree) -> SceneNodeId {
        match subtree {
            Subtree::Group { name, children } => {
                let id = self.insert_node(parent, name, NodeContent::Group);
                for child in children {
                    self.graft(Some(id), child);
                }
                id
            }
            Subtree::Drawable(drawable) => {
                let name = drawable.name.clone();
                self.insert_node(parent, name, NodeContent::Drawable(drawable))
            }
            Subtree::Seam { spec, coarse, fine } => {
                let id = self.insert_node(parent, "seam", NodeContent::Group);
                let coarse = self.graft(Some(id), *coarse);
                let fine = fine.map(|f| self.graft(Some(id), *f));
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.content = NodeContent::Seam(SeamNode::new(spec, coarse, fine));
                }
                id
            }
        }
    }

    /// Integrate a loaded tile as a lazy tile node.
    ///
    /// Level-0 tiles (`parent == None`) come back detached as
    /// [`MergeOutcome::Root`]. A tile whose parent is no longer in the graph
    /// is dropped.
    pub fn merge_tile(
        &mut self,
        key: TileKey,
        parent: Option<TileKey>,
        content: TileContent,
    ) -> MergeOutcome {
        if self.tile_index.contains_key(&key) {
            log::warn!("tile {key} merged twice, keeping the copy already in the graph");
            return MergeOutcome::Dropped;
        }

        let fine_parent = match parent {
            None => None,
            Some(parent_key) => match self.lazy_tile(parent_key) {
                Some((_, lazy)) => Some(lazy.fine()),
                None => {
                    log::debug!("dropping tile {key}: parent {parent_key} is not in the graph");
                    return MergeOutcome::Dropped;
                }
            },
        };

        let name = format!("lazy_{}_{}_{}", key.x, key.y, key.lod);
        let id = self.insert_node(fine_parent, name, NodeContent::Group);
        let coarse = self.graft(Some(id), content.subtree);
        let fine = self.insert_node(Some(id), "fine", NodeContent::Group);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.content = NodeContent::LazyTile(LazyTile::new(
                key,
                content.bounds,
                content.children,
                coarse,
                fine,
            ));
        }
        self.tile_index.insert(key, id);

        match parent {
            Some(parent_key) => {
                if let Some(lazy) = self.lazy_tile_mut(parent_key) {
                    lazy.child_merged(key, id);
                }
                log::trace!("merged tile {key} under {parent_key}");
                MergeOutcome::Child(id)
            }
            None => {
                log::trace!("merged root tile {key}");
                MergeOutcome::Root(id)
            }
        }
    }

    /// Remove a tile and everything under it from the graph.
    ///
    /// The removed nodes are returned instead of dropped so the caller can
    /// release them later. Unknown keys give `None`.
    pub fn unhook_tile(&mut self, key: TileKey) -> Option<DetachedSubtree> {
        let id = *self.tile_index.get(&key)?;

        // parent lazy tile is the grandparent: lazy -> fine group -> tile
        let owner = self
            .nodes
            .get(&id)
            .and_then(|n| n.parent)
            .and_then(|fine| self.nodes.get(&fine))
            .and_then(|n| n.parent);
        if let Some(owner) = owner {
            if let Some(lazy) = self.nodes.get_mut(&owner).and_then(SceneNode::as_lazy_tile_mut) {
                lazy.child_removed(key);
            }
        }

        let nodes = self.take_subtree(id);
        log::trace!("unhooked tile {key} ({} nodes)", nodes.len());
        Some(DetachedSubtree { key, nodes })
    }

    /// Remove a node and its entire subtree. Cannot remove the root.
    pub fn remove(&mut self, id: SceneNodeId) {
        if id == self.root {
            return;
        }
        if let Some(key) = self.get(id).and_then(SceneNode::as_lazy_tile).map(|l| l.key) {
            self.unhook_tile(key);
        } else {
            self.take_subtree(id);
        }
    }

    fn take_subtree(&mut self, id: SceneNodeId) -> Vec<SceneNode> {
        // Collect subtree IDs (BFS)
        let mut to_remove = vec![id];
        let mut i = 0;
        while i < to_remove.len() {
            if let Some(node) = self.nodes.get(&to_remove[i]) {
                to_remove.extend_from_slice(&node.children);
            }
            i += 1;
        }

        if let Some(parent_id) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|c| *c != id);
            }
        }

        let mut removed = Vec::with_capacity(to_remove.len());
        for nid in to_remove {
            if let Some(node) = self.nodes.remove(&nid) {
                if let Some(lazy) = node.as_lazy_tile() {
                    self.tile_index.remove(&lazy.key);
                }
                removed.push(node);
            }
        }
        removed
    }

    /// Set the visibility of a node.
    pub fn set_visible(&mut self, id: SceneNodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }

    pub fn get(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    /// Iterate over the children of a node.
    pub fn children(&self, id: SceneNodeId) -> impl Iterator<Item = SceneNodeId> + '_ {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    /// Lazy tile node for `key`, if that tile is merged.
    pub fn tile_node(&self, key: TileKey) -> Option<SceneNodeId> {
        self.tile_index.get(&key).copied()
    }

    pub fn lazy_tile(&self, key: TileKey) -> Option<(SceneNodeId, &LazyTile)> {
        let id = self.tile_node(key)?;
        let lazy = self.nodes.get(&id)?.as_lazy_tile()?;
        Some((id, lazy))
    }

    /// Record that a load for `key` under `parent` is outstanding. Returns
    /// false if the parent is not merged or already tracks the child.
    pub fn mark_requested(&mut self, key: TileKey, parent: TileKey) -> bool {
        self.lazy_tile_mut(parent).is_some_and(|lazy| lazy.child_requested(key))
    }

    /// Forget an outstanding load for `key` that ended without a merge.
    pub fn clear_requested(&mut self, key: TileKey, parent: TileKey) {
        if let Some(lazy) = self.lazy_tile_mut(parent) {
            lazy.request_abandoned(key);
        }
    }

    fn lazy_tile_mut(&mut self, key: TileKey) -> Option<&mut LazyTile> {
        let id = self.tile_node(key)?;
        self.nodes.get_mut(&id)?.as_lazy_tile_mut()
    }

    /// Keys of every merged tile, in key order.
    pub fn tile_keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.tile_index.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn tile_count(&self) -> usize {
        self.tile_index.len()
    }

    /// Total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::lazy_tile::ExpansionState;
    use crate::tile::{GridDatabaseConfig, GridTileSource, TileSource};

    fn source() -> GridTileSource {
        GridTileSource::new(GridDatabaseConfig::default())
    }

    fn merge(graph: &mut SceneGraph, source: &GridTileSource, key: TileKey) -> MergeOutcome {
        let content = source.load_tile(key).unwrap();
        graph.merge_tile(key, key.quadtree_parent(), content)
    }

    #[test]
    fn test_new_scene_graph() {
        let graph = SceneGraph::new();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.get(graph.root()).unwrap().name, "root");
        assert_eq!(graph.tile_count(), 0);
    }

    #[test]
    fn test_add_and_remove_subtree() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let parent = graph.add_child(root, "parent", NodeContent::Group);
        let child = graph.add_child(parent, "c1", NodeContent::Group);
        graph.add_child(child, "gc", NodeContent::Group);
        assert_eq!(graph.node_count(), 4);

        graph.remove(parent);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.children(root).count(), 0);

        graph.remove(root);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_graft_seam() {
        let source = source();
        let mut graph = SceneGraph::new();
        let content = source.load_tile(TileKey::new(0, 0, 0)).unwrap();
        let expected = content.subtree.node_count();

        let id = graph.graft(Some(graph.root()), content.subtree);
        assert_eq!(graph.node_count(), 1 + expected);

        let seams: Vec<_> = graph
            .children(id)
            .filter_map(|c| match &graph.get(c).unwrap().content {
                NodeContent::Seam(seam) => Some(seam.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(seams.len(), 2);
        for seam in seams {
            assert!(seam.fine().is_some());
            assert!(matches!(
                graph.get(seam.coarse()).unwrap().content,
                NodeContent::Drawable(_)
            ));
        }
    }

    #[test]
    fn test_root_tiles_stay_detached_until_attached() {
        let source = source();
        let mut graph = SceneGraph::new();
        let outcome = merge(&mut graph, &source, TileKey::new(0, 0, 0));

        let MergeOutcome::Root(id) = outcome else {
            panic!("expected a root merge, got {outcome:?}");
        };
        assert!(graph.get(id).unwrap().parent.is_none());
        assert_eq!(graph.children(graph.root()).count(), 0);

        assert!(graph.attach(id, graph.root()));
        assert!(!graph.attach(id, graph.root()));
        assert_eq!(graph.children(graph.root()).collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn test_merge_children_expands_parent() {
        let source = source();
        let mut graph = SceneGraph::new();
        let parent = TileKey::new(0, 0, 0);
        merge(&mut graph, &source, parent);

        let children = parent.quadtree_children();
        for (i, child) in children.iter().enumerate() {
            assert!(matches!(merge(&mut graph, &source, *child), MergeOutcome::Child(_)));
            let state = graph.lazy_tile(parent).unwrap().1.state();
            if i < 3 {
                assert_eq!(state, ExpansionState::Expanding);
            } else {
                assert_eq!(state, ExpansionState::Expanded);
            }
        }
        assert_eq!(graph.tile_count(), 5);

        let (_, lazy) = graph.lazy_tile(parent).unwrap();
        assert_eq!(graph.children(lazy.fine()).count(), 4);
    }

    #[test]
    fn test_merge_without_parent_is_dropped() {
        let source = source();
        let mut graph = SceneGraph::new();
        let nodes_before = graph.node_count();

        let outcome = merge(&mut graph, &source, TileKey::new(2, 2, 1));
        assert_eq!(outcome, MergeOutcome::Dropped);
        assert_eq!(graph.node_count(), nodes_before);
        assert!(graph.tile_node(TileKey::new(2, 2, 1)).is_none());
    }

    #[test]
    fn test_duplicate_merge_keeps_existing_subtree() {
        let source = source();
        let mut graph = SceneGraph::new();
        let root_key = TileKey::new(0, 0, 0);
        let root_id = merge(&mut graph, &source, root_key).node().unwrap();
        graph.attach(root_id, graph.root());
        let child = TileKey::new(1, 0, 1);
        let child_id = merge(&mut graph, &source, child).node().unwrap();
        let grandchild = TileKey::new(2, 0, 2);
        merge(&mut graph, &source, grandchild);
        let nodes_before = graph.node_count();

        assert_eq!(merge(&mut graph, &source, child), MergeOutcome::Dropped);
        assert_eq!(graph.node_count(), nodes_before);
        assert_eq!(graph.tile_node(child), Some(child_id));
        assert!(graph.tile_node(grandchild).is_some());
        let merged: Vec<_> = graph.lazy_tile(root_key).unwrap().1.merged_children().collect();
        assert_eq!(merged, vec![(child, child_id)]);

        assert_eq!(merge(&mut graph, &source, root_key), MergeOutcome::Dropped);
        assert_eq!(graph.tile_node(root_key), Some(root_id));
    }

    #[test]
    fn test_requested_child_marks_parent_expanding() {
        let source = source();
        let mut graph = SceneGraph::new();
        let parent = TileKey::new(0, 0, 0);
        let child = TileKey::new(1, 1, 1);
        assert!(!graph.mark_requested(child, parent));

        merge(&mut graph, &source, parent);
        assert!(graph.mark_requested(child, parent));
        assert_eq!(graph.lazy_tile(parent).unwrap().1.state(), ExpansionState::Expanding);
        graph.clear_requested(child, parent);
        assert_eq!(graph.lazy_tile(parent).unwrap().1.state(), ExpansionState::Collapsed);

        graph.mark_requested(child, parent);
        merge(&mut graph, &source, child);
        let (_, lazy) = graph.lazy_tile(parent).unwrap();
        assert_eq!(lazy.state(), ExpansionState::Expanding);
        assert!(!lazy.has_pending_requests());
    }

    #[test]
    fn test_unhook_removes_descendants_and_collapses_parent() {
        let source = source();
        let mut graph = SceneGraph::new();
        let root_key = TileKey::new(0, 0, 0);
        if let MergeOutcome::Root(id) = merge(&mut graph, &source, root_key) {
            graph.attach(id, graph.root());
        }
        let child = TileKey::new(1, 1, 1);
        let grandchild = TileKey::new(2, 2, 2);
        merge(&mut graph, &source, child);
        merge(&mut graph, &source, grandchild);
        assert_eq!(graph.tile_count(), 3);

        let detached = graph.unhook_tile(child).unwrap();
        assert_eq!(detached.key, child);
        assert!(detached.node_count() > 2);
        assert_eq!(graph.tile_keys(), vec![root_key]);
        assert_eq!(graph.lazy_tile(root_key).unwrap().1.state(), ExpansionState::Collapsed);
        assert!(graph.unhook_tile(grandchild).is_none());

        let detached = graph.unhook_tile(root_key).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.children(graph.root()).count(), 0);
        drop(detached);
    }
}
