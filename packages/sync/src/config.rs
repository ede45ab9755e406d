use crate::SyncError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "sleuth.config.json";

/// Sync layer configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Quiet period before a free-text edit is committed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Minimum interval between two refreshes of the local mirror
    #[serde(default = "default_mirror_throttle_ms")]
    pub mirror_throttle_ms: u64,

    /// Maximum number of undo levels (0 = unlimited)
    #[serde(default = "default_undo_max_levels")]
    pub undo_max_levels: usize,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_mirror_throttle_ms() -> u64 {
    50
}

fn default_undo_max_levels() -> usize {
    100
}

impl SyncConfig {
    /// Load config from a directory, falling back to defaults when the
    /// file does not exist
    pub fn load(dir: &Path) -> Result<Self, SyncError> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            Self::load_file(&config_path)
        } else {
            Ok(SyncConfig::default())
        }
    }

    /// Load config from an explicit file path
    pub fn load_file(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn config_path(dir: &Path) -> PathBuf {
        dir.join(DEFAULT_CONFIG_NAME)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn mirror_throttle(&self) -> Duration {
        Duration::from_millis(self.mirror_throttle_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            mirror_throttle_ms: default_mirror_throttle_ms(),
            undo_max_levels: default_undo_max_levels(),
        }
    }
}
