//! Tile identity and the tile database seam

pub mod key;
pub mod source;
pub mod grid;

pub use key::TileKey;
pub use source::{
    DatabaseHeader, LodInfo, TileBounds, TileContent, TileSource, TileUnavailable,
};
pub use grid::{GridDatabaseConfig, GridTileSource};
