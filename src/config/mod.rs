//! # Config Module
//!
//! User settings, stored as JSON.
//!
//! Missing file means defaults. Missing keys take their default and unknown
//! keys are ignored, so settings written by older or newer versions load.

use crate::core::comparator::ThresholdStrategy;
use crate::core::hasher::{HashScheme, HasherConfig, MAX_BLOCK_SIZE};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APP_DIR: &str = "tagsaver";

/// Perceptual hash parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashSettings {
    pub scheme: HashScheme,
    pub grid_size: u32,
    pub block_size: u32,
    /// RGB colour transparency is flattened onto
    pub background: [u8; 3],
    /// Seek position for animations and videos
    pub frame_offset_ms: u64,
    /// Budget for fingerprinting one item
    pub timeout_ms: u64,
    pub ffmpeg: PathBuf,
}

impl Default for HashSettings {
    fn default() -> Self {
        Self {
            scheme: HashScheme::Dct,
            grid_size: 32,
            block_size: 8,
            background: [255, 255, 255],
            frame_offset_ms: 100,
            timeout_ms: 10_000,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

/// All user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Refuse to save media that is already stored
    pub duplicate_detection: bool,
    /// Maximum bit distance still counted as a duplicate
    pub similarity_threshold: u32,
    pub hash: HashSettings,
    /// Budget for each call to the remote duplicate index
    pub remote_probe_timeout_ms: u64,
    /// Record database location
    pub database: PathBuf,
    /// Download folder name the host saves media under
    pub save_folder: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            duplicate_detection: true,
            similarity_threshold: 10,
            hash: HashSettings::default(),
            remote_probe_timeout_ms: 2_000,
            database: default_database_path(),
            save_folder: "TagSaver".to_string(),
        }
    }
}

impl Settings {
    /// `<config_dir>/tagsaver/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.json")
    }

    /// Load from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&Self::default_path())
    }

    /// Load and validate settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Settings = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(write_error)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let hash = &self.hash;
        if !(2..=MAX_BLOCK_SIZE).contains(&hash.block_size) {
            return Err(ConfigError::InvalidHashGeometry(format!(
                "block_size {} is outside 2-{}",
                hash.block_size, MAX_BLOCK_SIZE
            )));
        }
        if hash.scheme == HashScheme::Dct {
            if hash.grid_size < 2 {
                return Err(ConfigError::InvalidHashGeometry(format!(
                    "grid_size {} is below 2",
                    hash.grid_size
                )));
            }
            if hash.block_size > hash.grid_size {
                return Err(ConfigError::InvalidHashGeometry(format!(
                    "block_size {} exceeds grid_size {}",
                    hash.block_size, hash.grid_size
                )));
            }
        }

        let max = hash.scheme.bit_count(hash.block_size);
        if self.similarity_threshold > max {
            return Err(ConfigError::InvalidThreshold {
                value: self.similarity_threshold,
                max,
            });
        }
        Ok(())
    }

    /// Hash engine configuration described by these settings
    pub fn hasher_config(&self) -> HasherConfig {
        HasherConfig::new()
            .scheme(self.hash.scheme)
            .grid_size(self.hash.grid_size)
            .block_size(self.hash.block_size)
            .background(self.hash.background)
            .frame_offset(Duration::from_millis(self.hash.frame_offset_ms))
            .timeout(Duration::from_millis(self.hash.timeout_ms))
            .ffmpeg(self.hash.ffmpeg.clone())
    }

    pub fn threshold_strategy(&self) -> ThresholdStrategy {
        ThresholdStrategy::new(self.similarity_threshold)
    }

    pub fn remote_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_probe_timeout_ms)
    }
}

/// `<data_dir>/tagsaver/records.db`
fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("records.db")
}
