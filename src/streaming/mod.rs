//! Tile paging: deciding what to load, loading it, and handing it over

pub mod config;
pub mod managed_tile;
pub mod cell_tracker;
pub mod page_manager;
pub mod status;
pub mod change_queue;
pub mod loader;
pub mod pager;

pub use config::{PagerConfig, ThreadMode};
pub use managed_tile::{LoadOutcome, LoadState, ManagedTile, TileRequest};
pub use cell_tracker::CellTracker;
pub use page_manager::PageManager;
pub use status::{LodStatus, PageManagerStatus};
pub use change_queue::{ChangeQueue, MergeItem, PendingChanges};
pub use loader::BackgroundLoader;
pub use pager::{MergeReport, TilePager, UpdateReport};
