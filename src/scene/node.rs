//! Scene graph node types
//!
//! Node IDs, content variants, arena nodes, and the detached [`Subtree`]
//! form that tile sources build off the render thread.

use crate::core::types::DVec3;
use crate::math::Aabb;
use crate::tile::TileKey;

use super::lazy_tile::LazyTile;
use super::seam::SeamNode;

/// Unique identifier for a scene graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneNodeId(pub u64);

/// A piece of renderable geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawable {
    pub name: String,
    pub bounds: Aabb,
}

impl Drawable {
    pub fn new(name: impl Into<String>, bounds: Aabb) -> Self {
        Self { name: name.into(), bounds }
    }
}

/// Where a seam sits and which tiles it joins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeamSpec {
    /// Tile whose content holds the seam.
    pub owner: TileKey,
    /// Tile across the edge the seam covers.
    pub neighbour: TileKey,
    /// Midpoint of the shared edge.
    pub center: DVec3,
    /// Viewers closer than this may see the fine stitching.
    pub range: f64,
}

impl SeamSpec {
    /// Direction from owner to neighbour, one of the four edge offsets.
    pub fn direction(&self) -> (i32, i32) {
        (self.neighbour.x - self.owner.x, self.neighbour.y - self.owner.y)
    }
}

/// What a scene node contains.
#[derive(Clone, Debug)]
pub enum NodeContent {
    /// A grouping node with no geometry of its own.
    Group,
    Drawable(Drawable),
    /// A paged tile that expands into its children when they are all present.
    LazyTile(LazyTile),
    /// A strip stitching a tile edge to its neighbour.
    Seam(SeamNode),
}

/// A single node in the scene graph.
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub id: SceneNodeId,
    pub name: String,
    pub parent: Option<SceneNodeId>,
    pub children: Vec<SceneNodeId>,
    pub visible: bool,
    pub content: NodeContent,
}

impl SceneNode {
    pub fn new(id: SceneNodeId, name: impl Into<String>, content: NodeContent) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            visible: true,
            content,
        }
    }

    pub fn as_lazy_tile(&self) -> Option<&LazyTile> {
        match &self.content {
            NodeContent::LazyTile(lazy) => Some(lazy),
            _ => None,
        }
    }

    pub fn as_lazy_tile_mut(&mut self) -> Option<&mut LazyTile> {
        match &mut self.content {
            NodeContent::LazyTile(lazy) => Some(lazy),
            _ => None,
        }
    }
}

/// Tile content before it joins the graph.
///
/// Sources build these on the loader thread; [`super::SceneGraph::graft`]
/// turns one into arena nodes on the thread that owns the graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Subtree {
    Group { name: String, children: Vec<Subtree> },
    Drawable(Drawable),
    Seam {
        spec: SeamSpec,
        coarse: Box<Subtree>,
        fine: Option<Box<Subtree>>,
    },
}

impl Subtree {
    pub fn group(name: impl Into<String>, children: Vec<Subtree>) -> Self {
        Subtree::Group { name: name.into(), children }
    }

    /// Number of arena nodes this subtree becomes when grafted.
    pub fn node_count(&self) -> usize {
        match self {
            Subtree::Group { children, .. } => {
                1 + children.iter().map(Subtree::node_count).sum::<usize>()
            }
            Subtree::Drawable(_) => 1,
            Subtree::Seam { coarse, fine, .. } => {
                1 + coarse.node_count() + fine.as_ref().map_or(0, |f| f.node_count())
            }
        }
    }
}
