//! Printable paging state

use std::fmt;

use glam::IVec2;
use serde::Serialize;

use crate::core::types::DVec2;
use crate::tile::TileKey;

/// Snapshot of one level's cell tracker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LodStatus {
    pub lod: i32,
    pub cell: Option<IVec2>,
    pub aoi: IVec2,
    pub lod_size: IVec2,
    pub cell_size: DVec2,
    pub page_distance: f64,
    pub loads: Vec<TileKey>,
    pub unloads: Vec<TileKey>,
    pub loaded: Vec<TileKey>,
    pub failed: Vec<TileKey>,
    pub active_load: Option<TileKey>,
    pub active_unload: Option<TileKey>,
}

/// Snapshot of a whole page manager.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageManagerStatus {
    pub page_distance_scale: f64,
    pub location: Option<DVec2>,
    /// `"load"`, `"unload"` or `"none"`.
    pub outstanding: &'static str,
    pub levels: Vec<LodStatus>,
}

impl PageManagerStatus {
    pub fn loaded_count(&self) -> usize {
        self.levels.iter().map(|l| l.loaded.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_keys(f: &mut fmt::Formatter<'_>, label: &str, keys: &[TileKey]) -> fmt::Result {
    write!(f, "    {label} ({}):", keys.len())?;
    for key in keys {
        write!(f, " ({},{})", key.x, key.y)?;
    }
    writeln!(f)
}

impl fmt::Display for LodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  lod {}", self.lod)?;
        match self.cell {
            Some(cell) => writeln!(f, "    cell = ({}, {})", cell.x, cell.y)?,
            None => writeln!(f, "    cell = none")?,
        }
        writeln!(
            f,
            "    aoi = ({}, {}), lod size = ({}, {})",
            self.aoi.x, self.aoi.y, self.lod_size.x, self.lod_size.y
        )?;
        writeln!(
            f,
            "    cell size = ({}, {}), page distance = {}",
            self.cell_size.x, self.cell_size.y, self.page_distance
        )?;
        write_keys(f, "loads", &self.loads)?;
        write_keys(f, "unloads", &self.unloads)?;
        write_keys(f, "loaded", &self.loaded)?;
        if !self.failed.is_empty() {
            write_keys(f, "failed", &self.failed)?;
        }
        if let Some(key) = self.active_load {
            writeln!(f, "    active load = {key}")?;
        }
        if let Some(key) = self.active_unload {
            writeln!(f, "    active unload = {key}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PageManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "page manager")?;
        writeln!(f, "  page distance scale = {}", self.page_distance_scale)?;
        match self.location {
            Some(loc) => writeln!(f, "  location = ({}, {})", loc.x, loc.y)?,
            None => writeln!(f, "  location = none")?,
        }
        writeln!(f, "  outstanding = {}", self.outstanding)?;
        for level in &self.levels {
            write!(f, "{level}")?;
        }
        Ok(())
    }
}
