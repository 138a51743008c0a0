//! Backup data model.
//!
//! The serialized shape of `metadata.json`. Field names are camelCase and
//! must stay stable: backups move between independently built apps.

pub mod manifest;

pub use manifest::{
    checksum_file, compute_checksum, ChecksumAlgorithm, ChecksumWriter, PhotoManifestEntry,
};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::archive::resolve_in_namespace;
use crate::repository::{Category, Photo};
use crate::utils::errors::{BackupWarning, ValidationIssue};

/// Schema version written by this engine (ZIP container with manifest).
pub const CURRENT_BACKUP_VERSION: u32 = 2;

/// Legacy schema: a bare JSON document without photo files.
pub const LEGACY_JSON_VERSION: u32 = 1;

/// Name of the metadata document at the archive root
pub const METADATA_FILE: &str = "metadata.json";

/// Archive namespace holding photo files
pub const PHOTOS_DIR: &str = "photos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackupFormat {
    #[serde(rename = "ZIP")]
    Zip,
    #[default]
    #[serde(rename = "JSON")]
    Json,
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupFormat::Zip => write!(f, "ZIP"),
            BackupFormat::Json => write!(f, "JSON"),
        }
    }
}

/// Root document of a backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBackup {
    pub version: u32,

    /// Epoch milliseconds
    #[serde(default)]
    pub export_date: i64,

    #[serde(default)]
    pub app_version: String,

    #[serde(default)]
    pub format: BackupFormat,

    #[serde(default)]
    pub categories: Vec<BackupCategory>,

    #[serde(default)]
    pub photos: Vec<BackupPhoto>,

    #[serde(default)]
    pub settings: BackupSettings,

    #[serde(default)]
    pub photo_manifest: Vec<PhotoManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub icon_resource: Option<String>,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPhoto {
    pub id: i64,
    pub path: String,
    pub category_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_from_assets: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    #[serde(default)]
    pub is_dark_mode: bool,
    #[serde(default)]
    pub security_settings: BackupSecuritySettings,
}

/// Presence indicators only. Secret material never enters a backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSecuritySettings {
    #[serde(default, rename = "hasPIN")]
    pub has_pin: bool,
    #[serde(default)]
    pub has_pattern: bool,
    #[serde(default)]
    pub kid_safe_mode_enabled: bool,
    #[serde(default)]
    pub delete_protection_enabled: bool,
}

/// Findings from [`AppBackup::check_invariants`].
#[derive(Debug, Default)]
pub struct InvariantReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<BackupWarning>,
}

impl AppBackup {
    /// Whether this engine can read the declared schema version.
    pub fn is_supported_version(&self) -> bool {
        (LEGACY_JSON_VERSION..=CURRENT_BACKUP_VERSION).contains(&self.version)
    }

    /// Manifest entry for a photo, if exactly one exists.
    pub fn manifest_entry(&self, photo_id: i64) -> Option<&PhotoManifestEntry> {
        let mut matches = self.photo_manifest.iter().filter(|m| m.photo_id == photo_id);
        match (matches.next(), matches.next()) {
            (Some(entry), None) => Some(entry),
            _ => None,
        }
    }

    /// Check the structural invariants of a backup document.
    ///
    /// Duplicate manifest entries and entries outside `photos/` are errors.
    /// Missing manifest entries, manifest entries for unknown photos,
    /// duplicate category names and orphaned category references are
    /// warnings.
    pub fn check_invariants(&self) -> InvariantReport {
        let mut report = InvariantReport::default();

        let mut seen_names = HashSet::new();
        for category in &self.categories {
            if !seen_names.insert(category.name.as_str()) {
                report.warnings.push(BackupWarning::DuplicateCategoryName {
                    name: category.name.clone(),
                });
            }
        }

        let category_ids: HashSet<i64> = self.categories.iter().map(|c| c.id).collect();
        for photo in &self.photos {
            if !category_ids.contains(&photo.category_id) {
                report.warnings.push(BackupWarning::OrphanedCategory {
                    photo_id: photo.id,
                    category_id: photo.category_id,
                    assigned_to: None,
                });
            }
        }

        if self.format != BackupFormat::Zip {
            return report;
        }

        let mut per_photo: HashMap<i64, usize> = HashMap::new();
        for entry in &self.photo_manifest {
            *per_photo.entry(entry.photo_id).or_default() += 1;

            if resolve_in_namespace(&entry.zip_entry_name, PHOTOS_DIR).is_err() {
                report.errors.push(ValidationIssue::ManifestEntryOutsideNamespace {
                    entry: entry.zip_entry_name.clone(),
                });
            }
        }

        let photo_ids: HashSet<i64> = self.photos.iter().map(|p| p.id).collect();
        for photo in self.photos.iter().filter(|p| !p.is_from_assets) {
            match per_photo.get(&photo.id).copied().unwrap_or(0) {
                0 => report.warnings.push(BackupWarning::MissingPhotoFile {
                    photo_id: photo.id,
                    path: photo.path.clone(),
                }),
                1 => {}
                count => report.errors.push(ValidationIssue::DuplicateManifestEntry {
                    photo_id: photo.id,
                    count,
                }),
            }
        }

        let mut unknown: Vec<i64> = per_photo
            .keys()
            .filter(|id| !photo_ids.contains(id))
            .copied()
            .collect();
        unknown.sort_unstable();
        report.warnings.extend(
            unknown
                .into_iter()
                .map(|photo_id| BackupWarning::UnknownManifestEntry { photo_id }),
        );

        report
    }
}

impl From<&Category> for BackupCategory {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            display_name: c.display_name.clone(),
            position: c.position,
            icon_resource: c.icon_resource.clone(),
            color_hex: c.color_hex.clone(),
            is_default: c.is_default,
            created_at: c.created_at,
        }
    }
}

impl BackupCategory {
    pub fn to_category(&self) -> Category {
        Category {
            id: self.id,
            name: self.name.clone(),
            display_name: if self.display_name.is_empty() {
                self.name.clone()
            } else {
                self.display_name.clone()
            },
            position: self.position,
            icon_resource: self.icon_resource.clone(),
            color_hex: self.color_hex.clone(),
            is_default: self.is_default,
            created_at: self.created_at,
        }
    }
}

impl From<&Photo> for BackupPhoto {
    fn from(p: &Photo) -> Self {
        Self {
            id: p.id,
            path: p.path.clone(),
            category_id: p.category_id,
            name: p.name.clone(),
            is_from_assets: p.is_from_assets,
            created_at: p.created_at,
            file_size: p.file_size,
            width: p.width,
            height: p.height,
        }
    }
}

impl BackupPhoto {
    /// Domain photo stored at `path` under `category_id`.
    pub fn to_photo(&self, path: String, category_id: i64) -> Photo {
        Photo {
            id: self.id,
            path,
            category_id,
            name: self.name.clone(),
            is_from_assets: self.is_from_assets,
            created_at: self.created_at,
            file_size: self.file_size,
            width: self.width,
            height: self.height,
        }
    }
}
