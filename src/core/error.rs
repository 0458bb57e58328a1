//! Error types for the paging engine

use thiserror::Error;

use crate::tile::TileUnavailable;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    TileUnavailable(#[from] TileUnavailable),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Loader thread error: {0}")]
    ThreadState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
