//! Terrapager - streams a tiled terrain database into a live scene graph
//!
//! Tiles are paged in and out by a [`streaming::TilePager`] as the viewer
//! moves, grafted under lazy tile nodes in a [`scene::SceneGraph`], and
//! audited every frame by a [`scene::TileMapper`] so that neighbouring tiles
//! never differ by more than one level of detail.

pub mod core;
pub mod math;
pub mod tile;
pub mod scene;
pub mod streaming;
