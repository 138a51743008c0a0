//! Import/restore engine.
//!
//! Drives one restore through the [`RestorePhase`] state machine: validate,
//! snapshot (REPLACE only), extract, parse, then categories before photos
//! before settings. Failures after a destructive change roll the store
//! back to the snapshot.

mod phase;
mod strategy;
mod validate;

pub use phase::RestorePhase;
pub use strategy::ImportStrategy;
pub use validate::{validate_file, BackupPreview, ValidationResult};

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::{extract_archive, resolve_in_namespace};
use crate::config::Config;
use crate::fs::files::{copy_file, photo_file_name, sanitize_file_name, stored_photo_name};
use crate::fs::scratch::ScratchDir;
use crate::model::{AppBackup, BackupFormat, BackupPhoto, BackupSecuritySettings, METADATA_FILE, PHOTOS_DIR};
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::repository::{Category, Repositories};
use crate::rollback::RollbackManager;
use crate::utils::errors::{ArchiveError, BackupWarning, ImportError, ValidationIssue};
use strategy::{category_action, fallback_category, CategoryAction};

/// Name of the category created for orphaned photos when the store has none
pub const PLACEHOLDER_CATEGORY: &str = "uncategorized";

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub strategy: ImportStrategy,

    /// Apply the backup's dark-mode flag
    pub restore_settings: bool,

    /// Hash archived photos against manifest checksums during validation
    pub validate_integrity: bool,

    /// Treat every validation warning as blocking
    pub fail_on_warnings: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            strategy: ImportStrategy::default(),
            restore_settings: true,
            validate_integrity: true,
            fail_on_warnings: false,
        }
    }
}

/// Counts and warnings from a restore. Also carried, partially filled, by
/// [`ImportError::Interrupted`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub strategy: ImportStrategy,
    pub format: BackupFormat,
    pub categories_imported: usize,
    pub categories_updated: usize,
    pub categories_skipped: usize,
    pub photos_imported: usize,
    pub photos_skipped: usize,
    pub photos_missing_files: usize,
    pub settings_restored: bool,
    /// Protection the source device had; informational only
    pub source_security: BackupSecuritySettings,
    pub warnings: Vec<BackupWarning>,
    pub duration_ms: u64,
}

impl ImportSummary {
    fn warn(&mut self, warning: BackupWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

pub struct ImportEngine {
    repos: Repositories,
    config: Arc<Config>,
    rollback: RollbackManager,
}

impl ImportEngine {
    pub fn new(repos: Repositories, config: Arc<Config>) -> Self {
        let rollback = RollbackManager::new(repos.clone(), config.storage.scratch_dir.clone());
        Self {
            repos,
            config,
            rollback,
        }
    }

    /// Validate a backup without touching the store.
    pub async fn validate_backup(
        &self,
        path: &Path,
        validate_integrity: bool,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, ImportError> {
        let path = path.to_path_buf();
        let limits = self.config.limits.clone();
        let token = cancel.clone();

        tokio::task::spawn_blocking(move || validate_file(&path, &limits, validate_integrity, &token))
            .await
            .map_err(|e| ImportError::io("validation task failed", std::io::Error::other(e)))?
    }

    /// Restore the backup at `path` into the store.
    pub async fn restore_from_backup(
        &self,
        path: &Path,
        options: ImportOptions,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<RestorePhase>>,
    ) -> Result<ImportSummary, ImportError> {
        let mut run = RestoreRun::new(&self.repos, &self.config, options, on_progress);
        info!(
            path = %path.display(),
            strategy = %run.options.strategy,
            "Starting restore"
        );

        run.transition(RestorePhase::Validating, 1, "Validating backup");
        let validation = match self
            .validate_backup(path, run.options.validate_integrity, cancel)
            .await
        {
            Ok(validation) => validation,
            Err(e) => return Err(run.abort(e)),
        };

        let mut issues = validation.errors;
        if run.options.fail_on_warnings {
            issues.extend(validation.warnings.iter().cloned().map(ValidationIssue::Warning));
        }
        let (Some(format), Some(validated), true) =
            (validation.format, validation.backup, issues.is_empty())
        else {
            for issue in &issues {
                warn!("Backup rejected: {}", issue);
            }
            return Err(run.abort(ImportError::ValidationFailed { issues }));
        };

        run.summary.format = format;
        for warning in validation.warnings {
            // Orphans are reported again once their new category is known.
            if !matches!(warning, BackupWarning::OrphanedCategory { .. }) {
                run.record(warning);
            }
        }
        if let Err(e) = check_cancelled(cancel) {
            return Err(run.abort(e));
        }

        let snapshot = if run.options.strategy.is_destructive() {
            run.transition(RestorePhase::Snapshotting, 1, "Saving current data");
            match self.rollback.snapshot(&self.config.storage.photos_dir).await {
                Ok(token) => Some(token),
                Err(e) => {
                    let cause = ImportError::repository(RestorePhase::Snapshotting, e.into());
                    return Err(run.abort(cause));
                }
            }
        } else {
            None
        };

        let extraction = match format {
            BackupFormat::Zip => {
                run.transition(RestorePhase::Extracting, 0, "Extracting archive");
                match self.extract(path, cancel).await {
                    Ok(dir) => Some(dir),
                    Err(e) => return Err(run.abort(e)),
                }
            }
            BackupFormat::Json => None,
        };

        run.transition(RestorePhase::ParsingMetadata, 1, "Reading metadata");
        let backup = match &extraction {
            Some(dir) => match read_extracted_metadata(dir.path()).await {
                Ok(backup) => backup,
                Err(e) => return Err(run.abort(e)),
            },
            None => validated,
        };
        run.summary.source_security = backup.settings.security_settings;

        let applied = run
            .apply(&backup, extraction.as_ref().map(|d| d.path()), cancel)
            .await;

        if let Err(cause) = applied {
            drop(extraction);
            return Err(self.fail(run, snapshot, cause).await);
        }

        run.transition(RestorePhase::Cleanup, 1, "Cleaning up");
        if let Some(dir) = extraction {
            if let Err(e) = dir.remove().await {
                warn!("Failed to remove extraction directory: {}", e);
            }
        }
        drop(snapshot);

        run.transition(RestorePhase::Done, 0, "Restore complete");
        let summary = run.finish();

        info!(
            categories_imported = summary.categories_imported,
            categories_updated = summary.categories_updated,
            photos_imported = summary.photos_imported,
            photos_skipped = summary.photos_skipped,
            warnings = summary.warnings.len(),
            "Restore completed"
        );
        Ok(summary)
    }

    async fn extract(&self, path: &Path, cancel: &CancellationToken) -> Result<ScratchDir, ImportError> {
        let dir = ScratchDir::create(&self.config.storage.scratch_dir, "import")
            .await
            .map_err(|e| ImportError::io("failed to create extraction directory", e))?;

        let source = path.to_path_buf();
        let destination = dir.path().to_path_buf();
        let limits = self.config.limits.clone();
        let token = cancel.clone();

        let extracted = tokio::task::spawn_blocking(move || {
            extract_archive(&source, &destination, &limits, &token)
        })
        .await
        .map_err(|e| ImportError::io("extraction task failed", std::io::Error::other(e)))?;

        match extracted {
            Ok(result) => {
                debug!(files = result.files.len(), bytes = result.total_bytes, "Backup extracted");
                Ok(dir)
            }
            Err(ArchiveError::Cancelled) => Err(ImportError::Cancelled),
            Err(e) => Err(ImportError::Extraction(e)),
        }
    }

    /// Turn a failure after the store may have changed into the error the
    /// caller sees, rolling back first when a destructive change began.
    async fn fail(
        &self,
        mut run: RestoreRun<'_>,
        snapshot: Option<crate::rollback::RollbackToken>,
        cause: ImportError,
    ) -> ImportError {
        error!("Restore failed while {}: {}", run.phase, cause);
        run.transition(RestorePhase::Failed, 0, cause.to_string());

        let destructive = run.destructive_started;
        let changed = run.changed;
        let created_files = std::mem::take(&mut run.created_files);
        let partial = Box::new(run.finish());

        match snapshot {
            Some(token) if destructive => match self.rollback.restore(token, &created_files).await {
                Ok(_) => {
                    info!("Previous data restored after failed restore");
                    ImportError::Interrupted {
                        cause: Box::new(cause),
                        partial,
                        rolled_back: true,
                    }
                }
                Err(rollback) => {
                    error!("Rollback failed: {}", rollback);
                    ImportError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback,
                    }
                }
            },
            _ if changed => ImportError::Interrupted {
                cause: Box::new(cause),
                partial,
                rolled_back: false,
            },
            _ => cause,
        }
    }
}

/// Mutable state of one restore invocation.
struct RestoreRun<'a> {
    repos: &'a Repositories,
    config: &'a Config,
    options: ImportOptions,
    phase: RestorePhase,
    tracker: ProgressTracker<RestorePhase>,
    summary: ImportSummary,
    /// Photo files written into permanent storage
    created_files: Vec<PathBuf>,
    /// Existing data has been deleted
    destructive_started: bool,
    /// Any store write happened
    changed: bool,
    fallback_category: Option<i64>,
}

impl<'a> RestoreRun<'a> {
    fn new(
        repos: &'a Repositories,
        config: &'a Config,
        options: ImportOptions,
        on_progress: Option<ProgressCallback<RestorePhase>>,
    ) -> Self {
        let summary = ImportSummary {
            strategy: options.strategy,
            ..ImportSummary::default()
        };
        Self {
            repos,
            config,
            options,
            phase: RestorePhase::Start,
            tracker: ProgressTracker::new(RestorePhase::Start, on_progress),
            summary,
            created_files: Vec::new(),
            destructive_started: false,
            changed: false,
            fallback_category: None,
        }
    }

    fn transition(&mut self, next: RestorePhase, total: usize, message: impl Into<String>) {
        if !self.phase.can_transition_to(next) {
            warn!(from = ?self.phase, to = ?next, "Unexpected restore phase transition");
        }
        debug!(from = ?self.phase, to = ?next, "Restore phase");
        self.phase = next;
        self.tracker.enter(next, total, message);
    }

    fn record(&mut self, warning: BackupWarning) {
        self.tracker.record_error(warning.to_string());
        self.summary.warn(warning);
    }

    /// Failure before any store change: no rollback, no partial summary.
    fn abort(&mut self, cause: ImportError) -> ImportError {
        self.transition(RestorePhase::Failed, 0, cause.to_string());
        cause
    }

    fn finish(self) -> ImportSummary {
        let mut summary = self.summary;
        summary.duration_ms = self.tracker.elapsed().as_millis() as u64;
        summary
    }

    async fn apply(
        &mut self,
        backup: &AppBackup,
        extracted: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        let remap = self.import_categories(backup, cancel).await?;
        self.import_photos(backup, &remap, extracted, cancel).await?;
        self.restore_settings(backup).await
    }

    async fn clear_store(&mut self, cancel: &CancellationToken) -> Result<(), ImportError> {
        let phase = RestorePhase::ImportingCategories;
        let photos = self
            .repos
            .photos
            .get_all_photos()
            .await
            .map_err(|e| ImportError::repository(phase, e))?;
        let categories = self
            .repos
            .categories
            .get_all_categories()
            .await
            .map_err(|e| ImportError::repository(phase, e))?;

        self.destructive_started = true;
        self.changed = true;

        for photo in &photos {
            check_cancelled(cancel)?;
            self.repos
                .photos
                .delete_photo(photo.id)
                .await
                .map_err(|e| ImportError::repository(phase, e))?;
        }
        for category in categories.iter().filter(|c| !c.is_default) {
            check_cancelled(cancel)?;
            self.repos
                .categories
                .delete_category(category.id)
                .await
                .map_err(|e| ImportError::repository(phase, e))?;
        }

        info!(
            photos = photos.len(),
            categories = categories.iter().filter(|c| !c.is_default).count(),
            "Cleared existing data for REPLACE"
        );
        Ok(())
    }

    /// Import categories; returns backup id -> store id.
    async fn import_categories(
        &mut self,
        backup: &AppBackup,
        cancel: &CancellationToken,
    ) -> Result<HashMap<i64, i64>, ImportError> {
        let phase = RestorePhase::ImportingCategories;
        self.transition(phase, backup.categories.len(), "Importing categories");
        check_cancelled(cancel)?;

        if self.options.strategy.is_destructive() {
            self.clear_store(cancel).await?;
        }

        let mut taken_ids: HashSet<i64> = self
            .repos
            .categories
            .get_all_categories()
            .await
            .map_err(|e| ImportError::repository(phase, e))?
            .iter()
            .map(|c| c.id)
            .collect();

        let mut remap = HashMap::new();
        let mut by_name: HashMap<&str, i64> = HashMap::new();

        for category in &backup.categories {
            check_cancelled(cancel)?;

            if let Some(&id) = by_name.get(category.name.as_str()) {
                remap.insert(category.id, id);
                self.summary.categories_skipped += 1;
                self.tracker.advance(format!("Merged duplicate '{}'", category.name));
                continue;
            }

            let existing = self
                .repos
                .categories
                .get_category_by_name(&category.name)
                .await
                .map_err(|e| ImportError::repository(phase, e))?;

            let id = match category_action(self.options.strategy, existing.as_ref()) {
                CategoryAction::Insert => {
                    let mut row = category.to_category();
                    row.id = if self.options.strategy.preserves_ids() && !taken_ids.contains(&category.id) {
                        category.id
                    } else {
                        0
                    };
                    let id = self
                        .repos
                        .categories
                        .insert_category(row)
                        .await
                        .map_err(|e| ImportError::repository(phase, e))?;
                    self.changed = true;
                    taken_ids.insert(id);
                    self.summary.categories_imported += 1;
                    id
                }
                CategoryAction::Update {
                    existing_id,
                    keep_default,
                } => {
                    let mut row = category.to_category();
                    row.id = existing_id;
                    row.is_default = row.is_default || keep_default;
                    self.repos
                        .categories
                        .update_category(row)
                        .await
                        .map_err(|e| ImportError::repository(phase, e))?;
                    self.changed = true;
                    self.summary.categories_updated += 1;
                    existing_id
                }
                CategoryAction::Keep { existing_id } => {
                    self.summary.categories_skipped += 1;
                    self.record(BackupWarning::DuplicateSkipped {
                        item: "category".to_string(),
                        identity: category.name.clone(),
                    });
                    existing_id
                }
            };

            debug!(backup_id = category.id, store_id = id, "Category restored");
            by_name.insert(category.name.as_str(), id);
            remap.insert(category.id, id);
            self.tracker.advance(format!("Category '{}'", category.name));
        }

        Ok(remap)
    }

    async fn import_photos(
        &mut self,
        backup: &AppBackup,
        remap: &HashMap<i64, i64>,
        extracted: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        let phase = RestorePhase::ImportingPhotos;
        self.transition(phase, backup.photos.len(), "Importing photos");

        let existing = self
            .repos
            .photos
            .get_all_photos()
            .await
            .map_err(|e| ImportError::repository(phase, e))?;
        let mut taken_ids: HashSet<i64> = existing.iter().map(|p| p.id).collect();
        let mut known_paths: HashSet<String> = existing.into_iter().map(|p| p.path).collect();

        let photos_dir = self.config.storage.photos_dir.clone();
        tokio::fs::create_dir_all(&photos_dir)
            .await
            .map_err(|e| ImportError::io("failed to create photo storage", e))?;

        for photo in &backup.photos {
            check_cancelled(cancel)?;

            let archived = match extracted {
                Some(dir) if !photo.is_from_assets => archived_file(backup, photo, dir).await,
                _ => None,
            };
            let resolved = match &archived {
                Some((_, file_name)) => photos_dir
                    .join(stored_photo_name(photo.id, file_name))
                    .to_string_lossy()
                    .into_owned(),
                None => photo.path.clone(),
            };

            if known_paths.contains(&resolved) {
                self.summary.photos_skipped += 1;
                self.record(BackupWarning::DuplicateSkipped {
                    item: "photo".to_string(),
                    identity: resolved,
                });
                self.tracker.advance(format!("Skipped photo {}", photo.id));
                continue;
            }

            let category_id = match remap.get(&photo.category_id) {
                Some(id) => *id,
                None => {
                    let target = self.orphan_target().await?;
                    self.record(BackupWarning::OrphanedCategory {
                        photo_id: photo.id,
                        category_id: photo.category_id,
                        assigned_to: Some(target),
                    });
                    target
                }
            };

            let written = match &archived {
                Some((source, _)) => {
                    let target = PathBuf::from(&resolved);
                    copy_file(source, &target)
                        .await
                        .map_err(|e| ImportError::io(format!("failed to store photo {}", photo.id), e))?;
                    self.created_files.push(target.clone());
                    Some(target)
                }
                None => {
                    if !photo.is_from_assets {
                        self.summary.photos_missing_files += 1;
                        warn!(photo_id = photo.id, "Photo file missing from backup, importing record only");
                        self.record(BackupWarning::MissingPhotoFile {
                            photo_id: photo.id,
                            path: photo.path.clone(),
                        });
                    }
                    None
                }
            };

            let mut row = photo.to_photo(resolved.clone(), category_id);
            row.id = if self.options.strategy.preserves_ids() && !taken_ids.contains(&photo.id) {
                photo.id
            } else {
                0
            };

            match self.repos.photos.insert_photo(row).await {
                Ok(id) => {
                    self.changed = true;
                    taken_ids.insert(id);
                    known_paths.insert(resolved);
                    self.summary.photos_imported += 1;
                    debug!(backup_id = photo.id, store_id = id, "Photo restored");
                }
                Err(e) => {
                    if let Some(target) = written {
                        if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                            warn!("Failed to remove orphaned photo file: {}", remove_err);
                        }
                        self.created_files.retain(|p| p != &target);
                    }
                    return Err(ImportError::repository(phase, e));
                }
            }

            self.tracker.advance(format!("Photo {}", photo.id));
        }

        Ok(())
    }

    /// Category for photos whose category is not in the backup; created
    /// once if the store has none.
    async fn orphan_target(&mut self) -> Result<i64, ImportError> {
        if let Some(id) = self.fallback_category {
            return Ok(id);
        }
        let phase = RestorePhase::ImportingPhotos;

        let categories = self
            .repos
            .categories
            .get_all_categories()
            .await
            .map_err(|e| ImportError::repository(phase, e))?;

        let id = match fallback_category(&categories) {
            Some(id) => id,
            None => {
                let placeholder = Category {
                    id: 0,
                    name: PLACEHOLDER_CATEGORY.to_string(),
                    display_name: "Uncategorized".to_string(),
                    position: 0,
                    icon_resource: None,
                    color_hex: None,
                    is_default: true,
                    created_at: Utc::now().timestamp_millis(),
                };
                let id = self
                    .repos
                    .categories
                    .insert_category(placeholder)
                    .await
                    .map_err(|e| ImportError::repository(phase, e))?;
                self.changed = true;
                info!(category_id = id, "Created placeholder category for orphaned photos");
                id
            }
        };

        self.fallback_category = Some(id);
        Ok(id)
    }

    async fn restore_settings(&mut self, backup: &AppBackup) -> Result<(), ImportError> {
        let phase = RestorePhase::RestoringSettings;
        self.transition(phase, 1, "Restoring settings");

        if self.options.restore_settings {
            self.repos
                .theme
                .set_dark_mode(backup.settings.is_dark_mode)
                .await
                .map_err(|e| ImportError::repository(phase, e))?;
            self.changed = true;
            self.summary.settings_restored = true;
        }

        if backup.settings.security_settings.has_pin || backup.settings.security_settings.has_pattern {
            info!("Backup source had a PIN or pattern set; security settings are never restored");
        }

        self.tracker.advance("Settings restored");
        Ok(())
    }
}

/// Extracted file for `photo`, with the file name to store it under.
async fn archived_file(backup: &AppBackup, photo: &BackupPhoto, extracted: &Path) -> Option<(PathBuf, String)> {
    let entry = backup.manifest_entry(photo.id)?;
    let relative = resolve_in_namespace(&entry.zip_entry_name, PHOTOS_DIR).ok()?;
    let file = extracted.join(relative);

    let metadata = tokio::fs::metadata(&file).await.ok()?;
    if !metadata.is_file() {
        return None;
    }

    let file_name = if entry.file_name.is_empty() {
        photo_file_name(&photo.path, photo.id)
    } else {
        sanitize_file_name(&entry.file_name)
    };
    Some((file, file_name))
}

async fn read_extracted_metadata(dir: &Path) -> Result<AppBackup, ImportError> {
    let bytes = tokio::fs::read(dir.join(METADATA_FILE))
        .await
        .map_err(|e| ImportError::io("failed to read extracted metadata", e))?;
    let backup: AppBackup =
        serde_json::from_slice(&bytes).map_err(|e| ImportError::MetadataParse(e.to_string()))?;

    if !backup.is_supported_version() {
        return Err(ImportError::MetadataParse(format!(
            "unsupported backup version {}",
            backup.version
        )));
    }
    Ok(backup)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ImportError> {
    if cancel.is_cancelled() {
        Err(ImportError::Cancelled)
    } else {
        Ok(())
    }
}
