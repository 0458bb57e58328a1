//! Per-level cell tracking
//!
//! One tracker per level of detail turns the viewer position into a cell of
//! that level's grid and keeps the loaded set equal to the area-of-interest
//! window around it. Work is handed out one tile at a time on each side and
//! must be acknowledged before the next tile on that side is handed out.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use glam::IVec2;

use crate::core::types::DVec2;
use crate::core::{Error, Result};
use crate::tile::{TileKey, TileSource};

use super::managed_tile::{LoadOutcome, LoadState, ManagedTile, TileRequest};
use super::status::LodStatus;

pub struct CellTracker {
    source: Arc<dyn TileSource>,
    lod: i32,
    cell_size: DVec2,
    lod_range: f64,
    page_distance: f64,
    /// Window half-size in cells.
    aoi: IVec2,
    /// Grid dimensions of this level.
    lod_size: IVec2,
    cell: Option<IVec2>,
    load: VecDeque<ManagedTile>,
    unload: VecDeque<ManagedTile>,
    current: BTreeMap<TileKey, ManagedTile>,
    /// In-window tiles the source failed to produce; retried after they
    /// leave and re-enter the window.
    failed: BTreeSet<TileKey>,
    active_load: Option<ManagedTile>,
    active_unload: Option<ManagedTile>,
}

impl CellTracker {
    pub fn new(source: Arc<dyn TileSource>, lod: i32, page_distance_scale: f64) -> Result<Self> {
        let info = source
            .header()
            .lod(lod)
            .cloned()
            .ok_or_else(|| Error::InvalidConfig(format!("database has no level {lod}")))?;
        if info.tile_size.min_element() <= 0.0 || info.grid.min_element() < 1 {
            return Err(Error::InvalidConfig(format!(
                "level {lod} has an empty grid or tile size"
            )));
        }

        let mut tracker = Self {
            source,
            lod,
            cell_size: info.tile_size,
            lod_range: info.range,
            page_distance: 0.0,
            aoi: IVec2::ZERO,
            lod_size: info.grid,
            cell: None,
            load: VecDeque::new(),
            unload: VecDeque::new(),
            current: BTreeMap::new(),
            failed: BTreeSet::new(),
            active_load: None,
            active_unload: None,
        };
        tracker.apply_scale(page_distance_scale);
        Ok(tracker)
    }

    fn apply_scale(&mut self, scale: f64) {
        self.page_distance = self.lod_range * scale;
        // a window wider than the grid covers the whole level
        self.aoi = (DVec2::splat(self.page_distance) / self.cell_size)
            .floor()
            .as_ivec2()
            .clamp(IVec2::ZERO, self.lod_size);
    }

    /// Recompute the window size; the window itself is rebuilt immediately.
    pub(crate) fn set_page_distance_scale(&mut self, scale: f64) {
        self.apply_scale(scale);
        if self.cell.is_some() {
            self.update();
        }
    }

    pub fn lod(&self) -> i32 {
        self.lod
    }

    pub fn cell(&self) -> Option<IVec2> {
        self.cell
    }

    pub fn aoi(&self) -> IVec2 {
        self.aoi
    }

    pub fn page_distance(&self) -> f64 {
        self.page_distance
    }

    /// Move the viewer. Returns `false`, leaving every queue untouched, when
    /// the position falls in the cell already being tracked.
    pub fn set_location(&mut self, pos: DVec2) -> bool {
        let cell = (pos / self.cell_size)
            .floor()
            .as_ivec2()
            .clamp(IVec2::ZERO, self.lod_size - IVec2::ONE);
        if self.cell == Some(cell) {
            return false;
        }
        self.cell = Some(cell);
        self.update();
        true
    }

    /// South-west and north-east corners of the area of interest.
    pub fn window(&self) -> Option<(IVec2, IVec2)> {
        let cell = self.cell?;
        Some((
            cell.saturating_sub(self.aoi).max(IVec2::ZERO),
            cell.saturating_add(self.aoi).min(self.lod_size - IVec2::ONE),
        ))
    }

    pub fn in_window(&self, key: TileKey) -> bool {
        self.window().is_some_and(|(sw, ne)| inside(sw, ne, key))
    }

    fn update(&mut self) {
        let (Some(cell), Some((sw, ne))) = (self.cell, self.window()) else {
            return;
        };

        self.load.retain(|t| inside(sw, ne, t.key));

        let (back, leaving): (Vec<_>, Vec<_>) =
            self.unload.drain(..).partition(|t| inside(sw, ne, t.key));
        self.unload = leaving.into();
        for tile in back {
            self.current.insert(tile.key, tile);
        }

        let out: Vec<TileKey> = self
            .current
            .keys()
            .filter(|k| !inside(sw, ne, **k))
            .copied()
            .collect();
        for key in out {
            if let Some(tile) = self.current.remove(&key) {
                self.unload.push_back(tile);
            }
        }

        self.failed.retain(|k| inside(sw, ne, *k));

        for y in sw.y..=ne.y {
            for x in sw.x..=ne.x {
                let key = TileKey::new(x, y, self.lod);
                if self.is_tracked(key) || self.failed.contains(&key) || !self.source.has_tile(key) {
                    continue;
                }
                self.load.push_back(ManagedTile::new(key));
            }
        }

        // nearest cell first, key order among equals
        self.load
            .make_contiguous()
            .sort_by_key(|t| ((t.key.x - cell.x).abs().max((t.key.y - cell.y).abs()), t.key));

        log::trace!(
            "lod {} cell {cell}: {} to load, {} to unload, {} loaded",
            self.lod,
            self.load.len(),
            self.unload.len(),
            self.current.len()
        );
    }

    /// Loaded, queued for load, or being loaded.
    fn is_tracked(&self, key: TileKey) -> bool {
        self.current.contains_key(&key)
            || self.active_load.as_ref().is_some_and(|t| t.key == key)
            || self.load.iter().any(|t| t.key == key)
    }

    fn next_eligible(&self, parent_of: impl Fn(TileKey) -> Option<TileKey>) -> Option<(usize, Option<TileKey>)> {
        if self.lod == 0 {
            return (!self.load.is_empty()).then_some((0, None));
        }
        self.load
            .iter()
            .enumerate()
            .find_map(|(i, t)| parent_of(t.key).map(|p| (i, Some(p))))
    }

    /// Whether `next_load` would hand out a tile.
    pub fn has_eligible_load(&self, parent_of: impl Fn(TileKey) -> Option<TileKey>) -> bool {
        self.active_load.is_none() && self.next_eligible(parent_of).is_some()
    }

    /// Hand out the nearest queued tile whose parent is known.
    ///
    /// Level-0 tiles have no parent. For finer levels `parent_of` answers
    /// with the loaded coarse tile that listed the key as a child. Returns
    /// `None` while a load is outstanding.
    pub fn next_load(&mut self, parent_of: impl Fn(TileKey) -> Option<TileKey>) -> Option<TileRequest> {
        if self.active_load.is_some() {
            return None;
        }
        let (index, parent) = self.next_eligible(parent_of)?;
        let mut tile = self.load.remove(index)?;
        tile.state = LoadState::Loading;
        tile.parent = parent;

        let request = TileRequest { key: tile.key, parent };
        self.active_load = Some(tile);
        Some(request)
    }

    /// Settle the outstanding load. Returns its key, or `None` if nothing
    /// was outstanding.
    pub fn ack_load(&mut self, outcome: &LoadOutcome) -> Option<TileKey> {
        let mut tile = self.active_load.take()?;
        let key = tile.key;
        let wanted = self.in_window(key);

        match outcome {
            LoadOutcome::Loaded { children } => {
                tile.state = LoadState::Loaded;
                tile.children = children.clone();
                if wanted {
                    self.current.insert(key, tile);
                } else {
                    log::trace!("tile {key} left the window while loading");
                    self.unload.push_back(tile);
                }
            }
            LoadOutcome::Unavailable => {
                if wanted {
                    self.failed.insert(key);
                }
            }
            LoadOutcome::Cancelled => {
                tile.reset();
                if wanted {
                    self.load.push_front(tile);
                }
            }
        }
        Some(key)
    }

    pub fn has_unloads(&self) -> bool {
        !self.unload.is_empty()
    }

    /// Hand out the oldest queued unload. Returns `None` while an unload is
    /// outstanding.
    pub fn next_unload(&mut self) -> Option<TileRequest> {
        if self.active_unload.is_some() {
            return None;
        }
        let tile = self.unload.pop_front()?;
        let request = TileRequest { key: tile.key, parent: tile.parent };
        self.active_unload = Some(tile);
        Some(request)
    }

    /// Settle the outstanding unload, returning the tile as it was.
    pub fn ack_unload(&mut self) -> Option<ManagedTile> {
        self.active_unload.take()
    }

    /// Forget a loaded tile whose scene content went away with its parent.
    ///
    /// The tile is queued for load again at the front if it is still wanted.
    /// Returns the tile as it was, or `None` if it was not loaded.
    pub fn demote(&mut self, key: TileKey) -> Option<ManagedTile> {
        let tile = match self.current.remove(&key) {
            Some(tile) => tile,
            None => {
                let index = self.unload.iter().position(|t| t.key == key)?;
                self.unload.remove(index)?
            }
        };
        if self.in_window(key) && !self.is_tracked(key) && self.source.has_tile(key) {
            self.load.push_front(ManagedTile::new(key));
        }
        Some(tile)
    }

    /// Drop every pending load and queue every loaded tile for unload.
    ///
    /// Returns whether there is anything left to unload.
    pub fn stop(&mut self) -> bool {
        self.load.clear();
        self.failed.clear();
        self.cell = None;
        let current = std::mem::take(&mut self.current);
        self.unload.extend(current.into_values());
        !self.unload.is_empty() || self.active_unload.is_some()
    }

    pub fn is_loaded(&self, key: TileKey) -> bool {
        self.current.contains_key(&key)
    }

    pub fn loaded_keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.current.keys().copied()
    }

    pub fn pending_loads(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.load.iter().map(|t| t.key)
    }

    pub fn pending_unloads(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.unload.iter().map(|t| t.key)
    }

    pub fn status(&self) -> LodStatus {
        LodStatus {
            lod: self.lod,
            cell: self.cell,
            aoi: self.aoi,
            lod_size: self.lod_size,
            cell_size: self.cell_size,
            page_distance: self.page_distance,
            loads: self.pending_loads().collect(),
            unloads: self.pending_unloads().collect(),
            loaded: self.loaded_keys().collect(),
            failed: self.failed.iter().copied().collect(),
            active_load: self.active_load.as_ref().map(|t| t.key),
            active_unload: self.active_unload.as_ref().map(|t| t.key),
        }
    }
}

fn inside(sw: IVec2, ne: IVec2, key: TileKey) -> bool {
    key.x >= sw.x && key.x <= ne.x && key.y >= sw.y && key.y <= ne.y
}
