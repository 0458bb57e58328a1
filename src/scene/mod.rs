//! Scene graph holding paged terrain

pub mod flatten;
pub mod graph;
pub mod lazy_tile;
pub mod node;
pub mod seam;
pub mod tile_mapper;
pub mod traversal;

pub use flatten::{FlatDrawable, FrameCull};
pub use graph::{DetachedSubtree, MergeOutcome, SceneGraph};
pub use lazy_tile::{ExpansionState, LazyTile};
pub use node::{Drawable, NodeContent, SceneNode, SceneNodeId, SeamSpec, Subtree};
pub use seam::SeamNode;
pub use tile_mapper::{StackEntry, TileMapper, TileStack};
pub use traversal::{CullContext, SceneVisitor};
