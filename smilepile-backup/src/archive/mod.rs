//! Archive codec.
//!
//! Turns a staging directory into a ZIP file and a ZIP file back into a
//! staging directory. Extraction is always two passes: [`inspect_archive`]
//! walks the central directory and rejects hostile archives without writing
//! anything, then [`extract_archive`] re-opens the file and streams entries
//! to disk while re-checking actual sizes.
//!
//! The codec knows nothing about backups; it only deals in entry names,
//! sizes and limits.

mod extract;
mod sanitize;
mod writer;

pub use extract::{extract_archive, inspect_archive, EntryReader};
pub use sanitize::{resolve_in_namespace, sanitize_entry_name};
pub use writer::{create_archive, create_archive_with_level};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Resource limits enforced while reading untrusted archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    /// Maximum number of entries (files and directories)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Ceiling on the summed uncompressed size of all entries
    #[serde(default = "default_max_total_uncompressed")]
    pub max_total_uncompressed: u64,

    /// Maximum uncompressed/compressed ratio for a single entry
    #[serde(default = "default_max_compression_ratio")]
    pub max_compression_ratio: u64,

    /// Entries smaller than this skip the ratio test
    #[serde(default = "default_ratio_check_min_bytes")]
    pub ratio_check_min_bytes: u64,

    /// Maximum size of metadata.json
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: u64,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_total_uncompressed() -> u64 {
    1024 * 1024 * 1024
}

fn default_max_compression_ratio() -> u64 {
    100
}

fn default_ratio_check_min_bytes() -> u64 {
    1024 * 1024
}

fn default_max_metadata_bytes() -> u64 {
    64 * 1024 * 1024
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_total_uncompressed: default_max_total_uncompressed(),
            max_compression_ratio: default_max_compression_ratio(),
            ratio_check_min_bytes: default_ratio_check_min_bytes(),
            max_metadata_bytes: default_max_metadata_bytes(),
        }
    }
}

/// One entry accepted by pass 1.
#[derive(Debug, Clone)]
pub struct InventoryEntry {
    /// Position in the central directory
    pub index: usize,

    /// Raw name as stored in the archive
    pub name: String,

    /// Sanitized relative path
    pub path: PathBuf,

    pub is_dir: bool,

    /// Declared uncompressed size
    pub size: u64,

    pub compressed_size: u64,
}

/// Result of pass 1: every entry, already sanitized and within limits.
#[derive(Debug, Clone, Default)]
pub struct ArchiveInventory {
    pub entries: Vec<InventoryEntry>,

    /// Sum of declared uncompressed sizes
    pub total_declared: u64,
}

impl ArchiveInventory {
    /// Look up a file entry by its sanitized relative path (`/`-separated).
    pub fn file(&self, relative: &str) -> Option<&InventoryEntry> {
        let wanted: PathBuf = relative.split('/').filter(|p| !p.is_empty()).collect();
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.path == wanted)
    }

    /// Look up a file entry by an already sanitized path.
    pub fn file_at(&self, path: &std::path::Path) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| !e.is_dir && e.path == path)
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_dir).count()
    }
}

/// Result of a completed two-pass extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Absolute paths of every extracted file, in archive order
    pub files: Vec<PathBuf>,

    /// Number of directories created
    pub directories: usize,

    /// Bytes actually written
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_defaults() {
        let limits = ArchiveLimits::default();
        assert_eq!(limits.max_entries, 10_000);
        assert_eq!(limits.max_total_uncompressed, 1 << 30);
        assert_eq!(limits.max_compression_ratio, 100);
    }

    #[test]
    fn test_limits_partial_deserialize() {
        let limits: ArchiveLimits = toml::from_str("max_compression_ratio = 20").unwrap();
        assert_eq!(limits.max_compression_ratio, 20);
        assert_eq!(limits.max_entries, 10_000);
    }

    #[test]
    fn test_inventory_lookup_ignores_directories() {
        let inventory = ArchiveInventory {
            entries: vec![
                InventoryEntry {
                    index: 0,
                    name: "photos/".into(),
                    path: PathBuf::from("photos"),
                    is_dir: true,
                    size: 0,
                    compressed_size: 0,
                },
                InventoryEntry {
                    index: 1,
                    name: "photos/1_a.jpg".into(),
                    path: PathBuf::from("photos").join("1_a.jpg"),
                    is_dir: false,
                    size: 3,
                    compressed_size: 3,
                },
            ],
            total_declared: 3,
        };

        assert!(inventory.file("photos").is_none());
        assert_eq!(inventory.file("photos/1_a.jpg").map(|e| e.index), Some(1));
        assert_eq!(inventory.file_count(), 1);
    }
}
