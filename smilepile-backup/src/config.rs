//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file; every field has a default so a
//! partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::archive::ArchiveLimits;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: ArchiveLimits,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Permanent photo storage owned by the app
    #[serde(default = "default_photos_dir")]
    pub photos_dir: PathBuf,

    /// Default destination for exported archives
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Root for staging and rollback scratch directories
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Producer version written into metadata.json
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Archive filename prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Deflate level (None = library default)
    #[serde(default)]
    pub compression_level: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn data_root() -> PathBuf {
    std::env::temp_dir().join("smilepile")
}

fn default_photos_dir() -> PathBuf {
    data_root().join("photos")
}

fn default_export_dir() -> PathBuf {
    data_root().join("exports")
}

fn default_scratch_dir() -> PathBuf {
    data_root().join("scratch")
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_file_prefix() -> String {
    "SmilePile_Backup".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            photos_dir: default_photos_dir(),
            export_dir: default_export_dir(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            app_version: default_app_version(),
            file_prefix: default_file_prefix(),
            compression_level: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Configuration rooted at a single directory (photos, exports, scratch)
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            storage: StorageConfig {
                photos_dir: base.join("photos"),
                export_dir: base.join("exports"),
                scratch_dir: base.join("scratch"),
            },
            ..Self::default()
        }
    }
}
