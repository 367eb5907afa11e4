/// Persisted user configuration
///
/// Stored as pretty-printed JSON. Every field has a default, so a missing file or a
/// file written by an older version still loads.

use crate::game::{GameProfile, LevelWhitelist, RunOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Settings file used when none is given on the command line
pub const DEFAULT_SETTINGS_FILE: &str = "unrealloads.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_start: bool,
    pub auto_reset: bool,
    pub split_on_level_change: bool,
    /// Profile override, matched like `Registry::find_by_name`
    pub game: Option<String>,
    /// Level identifier -> enabled
    pub level_whitelist: BTreeMap<String, bool>,
}

impl Default for Settings {
    fn default() -> Self {
        let options = RunOptions::default();
        Self {
            auto_start: options.auto_start,
            auto_reset: options.auto_reset,
            split_on_level_change: options.split_on_level_change,
            game: None,
            level_whitelist: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Settings file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings = serde_json::from_str::<Settings>(&content)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved settings to {}", path.as_ref().display());
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            auto_start: self.auto_start,
            auto_reset: self.auto_reset,
            split_on_level_change: self.split_on_level_change,
        }
    }

    /// Effective whitelist for `profile`
    ///
    /// Profile levels start enabled and are overridden by persisted entries. Persisted
    /// levels the profile does not know are kept as user additions.
    pub fn whitelist_for(&self, profile: &GameProfile) -> LevelWhitelist {
        let mut whitelist = LevelWhitelist::for_profile(profile);
        for (level, enabled) in &self.level_whitelist {
            whitelist.set(level, *enabled);
        }
        whitelist
    }
}
