//! Page manager
//!
//! Owns one [`CellTracker`] per level and serialises their work into a
//! single stream of load and unload requests. Loads go coarse to fine and a
//! fine tile is only handed out once the coarse tile it hangs under is
//! loaded; unloads go fine to coarse. Exactly one request may be outstanding
//! at a time, and it must be acknowledged before the next is asked for.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::types::DVec2;
use crate::core::Result;
use crate::tile::{TileKey, TileSource};

use super::cell_tracker::CellTracker;
use super::config::validate_page_distance_scale;
use super::managed_tile::{LoadOutcome, TileRequest};
use super::status::PageManagerStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outstanding {
    None,
    Load(TileRequest),
    Unload(TileRequest),
}

pub struct PageManager {
    trackers: Vec<CellTracker>,
    page_distance_scale: f64,
    last_location: Option<DVec2>,
    outstanding: Outstanding,
    /// child -> loaded coarse tile that listed it
    parents: HashMap<TileKey, TileKey>,
}

impl PageManager {
    pub fn new(source: Arc<dyn TileSource>, page_distance_scale: f64) -> Result<Self> {
        validate_page_distance_scale(page_distance_scale)?;
        let trackers = (0..source.header().num_lods())
            .map(|lod| CellTracker::new(source.clone(), lod as i32, page_distance_scale))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            trackers,
            page_distance_scale,
            last_location: None,
            outstanding: Outstanding::None,
            parents: HashMap::new(),
        })
    }

    pub fn page_distance_scale(&self) -> f64 {
        self.page_distance_scale
    }

    /// Change the paging distance multiplier; values not above 1.0 are
    /// rejected and leave the manager unchanged.
    pub fn set_page_distance_scale(&mut self, scale: f64) -> Result<()> {
        validate_page_distance_scale(scale)?;
        self.page_distance_scale = scale;
        for tracker in &mut self.trackers {
            tracker.set_page_distance_scale(scale);
        }
        Ok(())
    }

    pub fn num_lods(&self) -> usize {
        self.trackers.len()
    }

    pub fn tracker(&self, lod: i32) -> Option<&CellTracker> {
        usize::try_from(lod).ok().and_then(|i| self.trackers.get(i))
    }

    /// Move the viewer (database-relative). Returns whether any level's
    /// cell changed. Repeating the last point is a no-op.
    pub fn set_location(&mut self, pos: DVec2) -> bool {
        if self.last_location == Some(pos) {
            return false;
        }
        self.last_location = Some(pos);

        let mut changed = false;
        for tracker in &mut self.trackers {
            changed |= tracker.set_location(pos);
        }
        changed
    }

    fn assert_idle(&self, what: &str) {
        if self.outstanding != Outstanding::None {
            panic!("{what} called with {:?} still unacknowledged", self.outstanding);
        }
    }

    /// Next tile to load, coarse levels first.
    ///
    /// # Panics
    /// If a load or unload is still outstanding.
    pub fn next_load(&mut self) -> Option<TileRequest> {
        self.assert_idle("next_load");
        let parents = &self.parents;
        let request = self
            .trackers
            .iter_mut()
            .find_map(|t| t.next_load(|k| parents.get(&k).copied()))?;
        self.outstanding = Outstanding::Load(request);
        Some(request)
    }

    /// Settle the outstanding load.
    ///
    /// # Panics
    /// If no load is outstanding.
    pub fn ack_load(&mut self, outcome: LoadOutcome) {
        let Outstanding::Load(request) = self.outstanding else {
            panic!("ack_load called with {:?} outstanding", self.outstanding);
        };
        self.outstanding = Outstanding::None;

        if let LoadOutcome::Loaded { children } = &outcome {
            for child in children {
                self.parents.insert(*child, request.key);
            }
        }
        if let Some(tracker) = self.tracker_mut(request.key.lod) {
            tracker.ack_load(&outcome);
        }
    }

    /// Next tile to unload, fine levels first.
    ///
    /// # Panics
    /// If a load or unload is still outstanding.
    pub fn next_unload(&mut self) -> Option<TileRequest> {
        self.assert_idle("next_unload");
        let request = self.trackers.iter_mut().rev().find_map(CellTracker::next_unload)?;
        self.outstanding = Outstanding::Unload(request);
        Some(request)
    }

    /// Settle the outstanding unload.
    ///
    /// Loaded descendants of the unloaded tile lose their scene content with
    /// it, so they are demoted back to not loaded.
    ///
    /// # Panics
    /// If no unload is outstanding.
    pub fn ack_unload(&mut self) {
        let Outstanding::Unload(request) = self.outstanding else {
            panic!("ack_unload called with {:?} outstanding", self.outstanding);
        };
        self.outstanding = Outstanding::None;

        let children = self
            .tracker_mut(request.key.lod)
            .and_then(CellTracker::ack_unload)
            .map(|tile| tile.children)
            .unwrap_or_default();
        self.forget_children(children);
    }

    fn forget_children(&mut self, mut pending: Vec<TileKey>) {
        while let Some(child) = pending.pop() {
            self.parents.remove(&child);
            let demoted = self.tracker_mut(child.lod).and_then(|t| t.demote(child));
            if let Some(tile) = demoted {
                log::trace!("tile {child} demoted with its parent");
                pending.extend(tile.children);
            }
        }
    }

    /// Whether a load or unload could be handed out right now.
    pub fn has_pending_work(&self) -> bool {
        self.trackers.iter().any(|t| {
            t.has_unloads() || t.has_eligible_load(|k| self.parents.get(&k).copied())
        })
    }

    /// Drop all pending loads and queue every loaded tile for unload.
    ///
    /// Returns whether anything is left to unload.
    pub fn stop(&mut self) -> bool {
        self.last_location = None;
        let mut remaining = false;
        for tracker in &mut self.trackers {
            remaining |= tracker.stop();
        }
        remaining
    }

    pub fn is_loaded(&self, key: TileKey) -> bool {
        self.tracker(key.lod).is_some_and(|t| t.is_loaded(key))
    }

    /// Every loaded tile, coarse levels first.
    pub fn loaded_tiles(&self) -> Vec<TileKey> {
        self.trackers.iter().flat_map(|t| t.loaded_keys()).collect()
    }

    pub fn status(&self) -> PageManagerStatus {
        PageManagerStatus {
            page_distance_scale: self.page_distance_scale,
            location: self.last_location,
            outstanding: match self.outstanding {
                Outstanding::None => "none",
                Outstanding::Load(_) => "load",
                Outstanding::Unload(_) => "unload",
            },
            levels: self.trackers.iter().map(CellTracker::status).collect(),
        }
    }

    fn tracker_mut(&mut self, lod: i32) -> Option<&mut CellTracker> {
        usize::try_from(lod).ok().and_then(|i| self.trackers.get_mut(i))
    }
}
