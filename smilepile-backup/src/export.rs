//! Export engine.
//!
//! Snapshots categories, photos and settings through the repository
//! collaborators, stages photo files with checksums, writes
//! `metadata.json` and packs the staging tree into a ZIP archive.

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::create_archive_with_level;
use crate::config::Config;
use crate::fs::files::{copy_file, photo_file_name, stored_photo_name};
use crate::fs::scratch::{PartialFile, ScratchDir};
use crate::model::{
    checksum_file, AppBackup, BackupCategory, BackupFormat, BackupPhoto, BackupSecuritySettings,
    BackupSettings, PhotoManifestEntry, CURRENT_BACKUP_VERSION, METADATA_FILE, PHOTOS_DIR,
};
use crate::progress::{format_bytes, ProgressCallback, ProgressPhase, ProgressTracker};
use crate::repository::Repositories;
use crate::utils::errors::{ArchiveError, BackupWarning, ExportError};

/// Export stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Snapshotting,
    CopyingPhotos,
    WritingMetadata,
    Archiving,
    Cleanup,
    Done,
}

impl ProgressPhase for ExportStage {
    fn span(&self) -> (f64, f64) {
        match self {
            ExportStage::Preparing => (0.0, 5.0),
            ExportStage::Snapshotting => (5.0, 10.0),
            ExportStage::CopyingPhotos => (10.0, 60.0),
            ExportStage::WritingMetadata => (60.0, 65.0),
            ExportStage::Archiving => (65.0, 95.0),
            ExportStage::Cleanup => (95.0, 100.0),
            ExportStage::Done => (100.0, 100.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Output file; defaults to `<export_dir>/<prefix>_<timestamp>.zip`
    pub destination: Option<PathBuf>,

    /// Include the theme flag and security indicators
    pub include_settings: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            destination: None,
            include_settings: true,
        }
    }
}

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub archive_path: PathBuf,
    pub archive_size: u64,
    pub categories: usize,
    pub photos: usize,
    /// Photo files actually packed (excludes assets and missing files)
    pub files_archived: usize,
    pub warnings: Vec<BackupWarning>,
}

pub struct ExportEngine {
    repos: Repositories,
    config: Arc<Config>,
}

impl ExportEngine {
    pub fn new(repos: Repositories, config: Arc<Config>) -> Self {
        Self { repos, config }
    }

    /// Create a backup archive of the current app state.
    ///
    /// A photo whose file is missing is left out of the backup and reported
    /// as a warning in the outcome, so every exported non-asset photo has
    /// exactly one manifest entry. The
    /// staging directory is removed on every exit path and a partially
    /// written archive is deleted on failure.
    pub async fn create_backup(
        &self,
        options: ExportOptions,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<ExportStage>>,
    ) -> Result<ExportOutcome, ExportError> {
        let mut tracker = ProgressTracker::new(ExportStage::Preparing, on_progress);
        tracker.enter(ExportStage::Preparing, 0, "Preparing staging directory");

        let staging = ScratchDir::create(&self.config.storage.scratch_dir, "export")
            .await
            .map_err(|e| ExportError::io("failed to create staging directory", e))?;
        check_cancelled(cancel)?;

        tracker.enter(ExportStage::Snapshotting, 0, "Reading categories and photos");
        let categories = self
            .repos
            .categories
            .get_all_categories()
            .await
            .map_err(ExportError::Repository)?;
        let photos = self
            .repos
            .photos
            .get_all_photos()
            .await
            .map_err(ExportError::Repository)?;
        let settings = if options.include_settings {
            self.snapshot_settings().await?
        } else {
            BackupSettings::default()
        };
        check_cancelled(cancel)?;

        info!(
            categories = categories.len(),
            photos = photos.len(),
            "Export snapshot taken"
        );

        tracker.enter(ExportStage::CopyingPhotos, photos.len(), "Copying photos");
        let photos_dir = staging.path().join(PHOTOS_DIR);
        tokio::fs::create_dir_all(&photos_dir)
            .await
            .map_err(|e| ExportError::io("failed to create staging photos directory", e))?;

        let mut exported = Vec::with_capacity(photos.len());
        let mut manifest = Vec::new();
        let mut warnings = Vec::new();

        for photo in &photos {
            check_cancelled(cancel)?;

            if photo.is_from_assets {
                exported.push(BackupPhoto::from(photo));
                tracker.advance(format!("Skipped bundled photo {}", photo.id));
                continue;
            }

            let file_name = photo_file_name(&photo.path, photo.id);
            let stored_name = stored_photo_name(photo.id, &file_name);
            let target = photos_dir.join(&stored_name);

            match copy_file(Path::new(&photo.path), &target).await {
                Ok(size) => {
                    let checksum = hash_file(target).await?;
                    debug!(photo_id = photo.id, bytes = size, "Staged photo");
                    exported.push(BackupPhoto::from(photo));
                    manifest.push(PhotoManifestEntry {
                        photo_id: photo.id,
                        original_path: photo.path.clone(),
                        zip_entry_name: format!("{}/{}", PHOTOS_DIR, stored_name),
                        file_name,
                        file_size: size,
                        checksum: Some(checksum),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    let warning = BackupWarning::MissingPhotoFile {
                        photo_id: photo.id,
                        path: photo.path.clone(),
                    };
                    warn!(photo_id = photo.id, "Photo file missing, leaving it out of the backup");
                    tracker.record_error(warning.to_string());
                    warnings.push(warning);
                    tracker.advance(format!("Skipped photo {}", photo.id));
                    continue;
                }
                Err(e) => {
                    return Err(ExportError::io(
                        format!("failed to stage photo {}", photo.id),
                        e,
                    ))
                }
            }

            tracker.advance(format!("Copied photo {}", photo.id));
        }

        tracker.enter(ExportStage::WritingMetadata, 1, "Writing metadata");
        let backup = AppBackup {
            version: CURRENT_BACKUP_VERSION,
            export_date: Utc::now().timestamp_millis(),
            app_version: self.config.export.app_version.clone(),
            format: BackupFormat::Zip,
            categories: categories.iter().map(BackupCategory::from).collect(),
            photos: exported,
            settings,
            photo_manifest: manifest,
        };

        let report = backup.check_invariants();
        for issue in &report.errors {
            warn!("Exported metadata failed self-check: {}", issue);
        }

        let json = serde_json::to_vec_pretty(&backup)?;
        tokio::fs::write(staging.path().join(METADATA_FILE), json)
            .await
            .map_err(|e| ExportError::io("failed to write metadata", e))?;
        tracker.advance("Metadata written");
        check_cancelled(cancel)?;

        let destination = options
            .destination
            .clone()
            .unwrap_or_else(|| self.default_archive_path());
        let files_archived = backup.photo_manifest.len();

        tracker.enter(ExportStage::Archiving, 0, "Compressing archive");
        let partial = PartialFile::new(&destination);
        let source = staging.path().to_path_buf();
        let level = self.config.export.compression_level;
        let token = cancel.clone();

        let (result, mut tracker) = tokio::task::spawn_blocking(move || {
            let mut tracker = tracker;
            let result = create_archive_with_level(
                &source,
                &destination,
                level,
                &token,
                &mut |done, total, name| tracker.update(done, total, name),
            );
            (result, tracker)
        })
        .await
        .map_err(|e| ExportError::io("archive task failed", std::io::Error::other(e)))?;

        result.map_err(|e| match e {
            ArchiveError::Cancelled => ExportError::Cancelled,
            other => ExportError::Archive(other),
        })?;

        let archive_size = tokio::fs::metadata(partial.path())
            .await
            .map_err(|e| ExportError::io("failed to stat archive", e))?
            .len();
        let archive_path = partial.keep();

        tracker.enter(ExportStage::Cleanup, 1, "Removing staging directory");
        if let Err(e) = staging.remove().await {
            warn!("Failed to remove staging directory: {}", e);
        }
        tracker.enter(ExportStage::Done, 0, "Backup complete");

        info!(
            path = %archive_path.display(),
            size = %format_bytes(archive_size),
            photos = backup.photos.len(),
            files = files_archived,
            warnings = warnings.len(),
            "Backup created"
        );

        Ok(ExportOutcome {
            archive_path,
            archive_size,
            categories: backup.categories.len(),
            photos: backup.photos.len(),
            files_archived,
            warnings,
        })
    }

    async fn snapshot_settings(&self) -> Result<BackupSettings, ExportError> {
        let is_dark_mode = self
            .repos
            .theme
            .is_dark_mode()
            .await
            .map_err(ExportError::Repository)?;
        let indicators = self
            .repos
            .security
            .security_indicators()
            .await
            .map_err(ExportError::Repository)?;

        Ok(BackupSettings {
            is_dark_mode,
            security_settings: BackupSecuritySettings {
                has_pin: indicators.has_pin,
                has_pattern: indicators.has_pattern,
                kid_safe_mode_enabled: indicators.kid_safe_mode_enabled,
                delete_protection_enabled: indicators.delete_protection_enabled,
            },
        })
    }

    /// `<export_dir>/<prefix>_<YYYYMMDD_HHMMSS>.zip`
    pub fn default_archive_path(&self) -> PathBuf {
        let export = &self.config.export;
        self.config.storage.export_dir.join(format!(
            "{}_{}.zip",
            export.file_prefix,
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ExportError> {
    if cancel.is_cancelled() {
        info!("Export cancelled");
        Err(ExportError::Cancelled)
    } else {
        Ok(())
    }
}

async fn hash_file(path: PathBuf) -> Result<String, ExportError> {
    tokio::task::spawn_blocking(move || checksum_file(&path))
        .await
        .map_err(|e| ExportError::io("checksum task failed", std::io::Error::other(e)))?
        .map_err(|e| ExportError::io("failed to checksum staged photo", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::EntryReader;
    use crate::progress::Progress;
    use crate::repository::memory::MemoryStore;
    use crate::repository::{Category, CategoryRepository, Photo, PhotoRepository};
    use std::sync::Mutex;
    use tempfile::TempDir;

    async fn seeded_store(photo_dir: &Path) -> anyhow::Result<Arc<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        let cat = store
            .insert_category(Category {
                id: 1,
                name: "family".into(),
                display_name: "Family".into(),
                position: 0,
                icon_resource: None,
                color_hex: Some("#4CAF50".into()),
                is_default: false,
                created_at: 0,
            })
            .await?;

        std::fs::create_dir_all(photo_dir)?;
        let present = photo_dir.join("beach.jpg");
        std::fs::write(&present, b"beach-bytes")?;

        for (id, path, assets) in [
            (1, present.to_string_lossy().to_string(), false),
            (2, photo_dir.join("gone.jpg").to_string_lossy().to_string(), false),
            (3, "assets/sample.png".to_string(), true),
        ] {
            store
                .insert_photo(Photo {
                    id,
                    path,
                    category_id: cat,
                    name: format!("photo {}", id),
                    is_from_assets: assets,
                    created_at: 0,
                    file_size: 11,
                    width: 10,
                    height: 10,
                })
                .await?;
        }
        Ok(store)
    }

    #[tokio::test]
    async fn test_export_skips_missing_files_with_warning() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Arc::new(Config::with_base_dir(temp_dir.path()));
        let store = seeded_store(&temp_dir.path().join("photos")).await?;
        let engine = ExportEngine::new(Repositories::from_store(store), config.clone());

        let percents: Arc<Mutex<Vec<f64>>> = Arc::default();
        let sink = percents.clone();
        let callback: ProgressCallback<ExportStage> =
            Arc::new(move |p: &Progress<ExportStage>| sink.lock().unwrap().push(p.percent_complete));

        let outcome = engine
            .create_backup(ExportOptions::default(), &CancellationToken::new(), Some(callback))
            .await?;

        assert_eq!(outcome.categories, 1);
        assert_eq!(outcome.photos, 2);
        assert_eq!(outcome.files_archived, 1);
        assert_eq!(
            outcome.warnings,
            vec![BackupWarning::MissingPhotoFile {
                photo_id: 2,
                path: temp_dir.path().join("photos/gone.jpg").to_string_lossy().to_string(),
            }]
        );
        assert!(outcome.archive_path.starts_with(&config.storage.export_dir));
        assert!(outcome.archive_size > 0);

        let json = EntryReader::open(&outcome.archive_path)?
            .read(METADATA_FILE, 1024 * 1024)?
            .ok_or_else(|| anyhow::anyhow!("metadata.json missing"))?;
        let backup: AppBackup = serde_json::from_slice(&json)?;
        let photo_ids: Vec<i64> = backup.photos.iter().map(|p| p.id).collect();
        assert_eq!(photo_ids, vec![1, 3]);
        assert_eq!(backup.photo_manifest.len(), 1);
        let report = backup.check_invariants();
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());

        let percents = percents.lock().unwrap();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last().copied(), Some(100.0));

        // Staging is gone.
        let leftovers: Vec<_> = std::fs::read_dir(&config.storage.scratch_dir)?.collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_export_leaves_nothing_behind() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Arc::new(Config::with_base_dir(temp_dir.path()));
        let store = seeded_store(&temp_dir.path().join("photos")).await?;
        let engine = ExportEngine::new(Repositories::from_store(store), config.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let destination = temp_dir.path().join("out.zip");

        let result = engine
            .create_backup(
                ExportOptions {
                    destination: Some(destination.clone()),
                    include_settings: true,
                },
                &cancel,
                None,
            )
            .await;

        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert!(!destination.exists());
        let leftovers: Vec<_> = std::fs::read_dir(&config.storage.scratch_dir)?.collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_default_archive_name() {
        let config = Arc::new(Config::with_base_dir(Path::new("/data")));
        let engine = ExportEngine::new(
            Repositories::from_store(Arc::new(MemoryStore::new())),
            config,
        );

        let path = engine.default_archive_path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(path.starts_with("/data/exports"));
        assert!(name.starts_with("SmilePile_Backup_"));
        assert!(name.ends_with(".zip"));
        assert_eq!(name.len(), "SmilePile_Backup_20250101_120000.zip".len());
    }
}
