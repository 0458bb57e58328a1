//! Pager configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// How tile loading is driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// Everything happens inside `TilePager::update_no_thread`.
    #[default]
    None,
    /// Loader thread performs one round of paging work per position update.
    Synchronous,
    /// Loader thread keeps working while anything is left to page.
    Background,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    /// Multiplier on each level's range giving its paging distance. Must be
    /// greater than 1 so tiles arrive before they are needed.
    pub page_distance_scale: f64,
    /// Loads per `update_no_thread` call; 0 means no limit.
    pub max_tiles_per_update: usize,
    pub thread_mode: ThreadMode,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_distance_scale: 1.2,
            max_tiles_per_update: 1,
            thread_mode: ThreadMode::None,
        }
    }
}

impl PagerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_page_distance_scale(self.page_distance_scale)
    }

    /// Save to a JSON file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file (sync), rejecting invalid values
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn validate_page_distance_scale(scale: f64) -> Result<()> {
    // also rejects NaN
    if scale > 1.0 && scale.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "page distance scale must be finite and greater than 1.0, got {scale}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PagerConfig::default();
        assert_eq!(config.page_distance_scale, 1.2);
        assert_eq!(config.max_tiles_per_update, 1);
        assert_eq!(config.thread_mode, ThreadMode::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_small_scale() {
        for scale in [1.0, 0.5, -2.0, f64::NAN, f64::INFINITY] {
            let config = PagerConfig { page_distance_scale: scale, ..Default::default() };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))), "scale {scale}");
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pager.json");

        let config = PagerConfig {
            page_distance_scale: 1.5,
            max_tiles_per_update: 0,
            thread_mode: ThreadMode::Background,
        };
        config.save_sync(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"background\""));

        let loaded = PagerConfig::load_sync(&path).unwrap();
        assert_eq!(loaded.page_distance_scale, 1.5);
        assert_eq!(loaded.max_tiles_per_update, 0);
        assert_eq!(loaded.thread_mode, ThreadMode::Background);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pager.json");

        std::fs::write(&path, r#"{ "page_distance_scale": 0.9 }"#).unwrap();
        assert!(matches!(PagerConfig::load_sync(&path), Err(Error::InvalidConfig(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(PagerConfig::load_sync(&path), Err(Error::Json(_))));

        assert!(matches!(
            PagerConfig::load_sync(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
