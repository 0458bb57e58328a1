//! Lazy tile nodes
//!
//! A lazy tile holds a paged tile's own (coarse) content and a fine group
//! that fills up with child tiles as they are merged. It only switches to
//! the fine group once every child it expects is present, so a partially
//! loaded refinement is never drawn.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::types::DVec3;
use crate::tile::{TileBounds, TileKey};

use super::node::SceneNodeId;

/// How far a lazy tile's refinement has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpansionState {
    /// No child tile requested or merged.
    Collapsed,
    /// A child load is outstanding, or only some expected children are merged.
    Expanding,
    /// Every expected child merged.
    Expanded,
}

#[derive(Clone, Debug)]
pub struct LazyTile {
    pub key: TileKey,
    /// Same-level neighbours, north, east, south, west.
    pub neighbours: [TileKey; 4],
    pub bounds: TileBounds,
    coarse: SceneNodeId,
    fine: SceneNodeId,
    expected: Vec<TileKey>,
    merged: BTreeMap<TileKey, SceneNodeId>,
    /// Children handed to the loader and not yet merged.
    requested: BTreeSet<TileKey>,
    state: ExpansionState,
}

impl LazyTile {
    pub fn new(
        key: TileKey,
        bounds: TileBounds,
        expected: Vec<TileKey>,
        coarse: SceneNodeId,
        fine: SceneNodeId,
    ) -> Self {
        Self {
            key,
            neighbours: key.neighbours(),
            bounds,
            coarse,
            fine,
            expected,
            merged: BTreeMap::new(),
            requested: BTreeSet::new(),
            state: ExpansionState::Collapsed,
        }
    }

    pub fn state(&self) -> ExpansionState {
        self.state
    }

    pub fn coarse(&self) -> SceneNodeId {
        self.coarse
    }

    /// Group node that merged child tiles hang under.
    pub fn fine(&self) -> SceneNodeId {
        self.fine
    }

    pub fn expected_children(&self) -> &[TileKey] {
        &self.expected
    }

    pub fn merged_children(&self) -> impl Iterator<Item = (TileKey, SceneNodeId)> + '_ {
        self.merged.iter().map(|(k, id)| (*k, *id))
    }

    /// Whether any child load is outstanding.
    pub fn has_pending_requests(&self) -> bool {
        !self.requested.is_empty()
    }

    /// A load for `key` was handed out. Returns false if the child is
    /// already merged or already requested.
    pub(crate) fn child_requested(&mut self, key: TileKey) -> bool {
        if self.merged.contains_key(&key) || !self.requested.insert(key) {
            return false;
        }
        self.refresh_state();
        true
    }

    /// The load for `key` finished without a merge.
    pub(crate) fn request_abandoned(&mut self, key: TileKey) {
        if self.requested.remove(&key) {
            self.refresh_state();
        }
    }

    pub(crate) fn child_merged(&mut self, key: TileKey, node: SceneNodeId) {
        if !self.expected.contains(&key) {
            log::debug!("tile {key} merged under {} which did not list it", self.key);
        }
        self.requested.remove(&key);
        self.merged.insert(key, node);
        self.refresh_state();
    }

    pub(crate) fn child_removed(&mut self, key: TileKey) {
        self.merged.remove(&key);
        self.requested.remove(&key);
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        self.state = if self.merged.is_empty() && self.requested.is_empty() {
            ExpansionState::Collapsed
        } else if self.expected.iter().all(|k| self.merged.contains_key(k)) {
            ExpansionState::Expanded
        } else {
            ExpansionState::Expanding
        };
    }

    /// Whether a viewer at `eye` should see the merged children.
    ///
    /// Fine covers `[0, min_range)`; a blacklisted tile stays coarse.
    pub fn uses_fine(&self, eye: DVec3, blacklisted: bool) -> bool {
        self.state == ExpansionState::Expanded
            && !blacklisted
            && eye.distance(self.bounds.center) < self.bounds.min_range
    }

    /// The child to traverse this frame.
    pub fn select(&self, eye: DVec3, blacklisted: bool) -> &SceneNodeId {
        if self.uses_fine(eye, blacklisted) { &self.fine } else { &self.coarse }
    }
}
