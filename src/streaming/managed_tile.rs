//! Per-tile paging bookkeeping

use serde::Serialize;

use crate::tile::TileKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

/// A tile the paging layer is tracking.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ManagedTile {
    pub key: TileKey,
    pub state: LoadState,
    /// Coarse tile this one hangs under, set once it is handed out for load.
    pub parent: Option<TileKey>,
    /// Finer tiles discovered while parsing this one; empty until loaded.
    pub children: Vec<TileKey>,
}

impl ManagedTile {
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            state: LoadState::NotLoaded,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Back to the state of a tile that was never loaded.
    pub(crate) fn reset(&mut self) {
        self.state = LoadState::NotLoaded;
        self.parent = None;
        self.children.clear();
    }
}

/// One unit of work handed to the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRequest {
    pub key: TileKey,
    pub parent: Option<TileKey>,
}

/// What the loader reports back for a load request.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadOutcome {
    Loaded { children: Vec<TileKey> },
    /// The source could not produce the tile.
    Unavailable,
    /// The loader stopped before the tile could be used.
    Cancelled,
}
