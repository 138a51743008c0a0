//! Rollback manager.
//!
//! Captures the state a destructive restore may change (categories, photos,
//! the theme flag and app-owned photo files) and can put it back. A
//! [`RollbackToken`] lives for a single restore; its scratch directory is
//! removed when the token is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::fs::files::{copy_file, is_within, photo_file_name};
use crate::fs::scratch::ScratchDir;
use crate::repository::{Category, Photo, Repositories};
use crate::utils::errors::RollbackError;

/// Point-in-time capture of restorable state.
#[derive(Debug)]
pub struct RollbackToken {
    categories: Vec<Category>,
    photos: Vec<Photo>,
    dark_mode: bool,
    /// (original location, saved copy)
    files: Vec<(PathBuf, PathBuf)>,
    scratch: ScratchDir,
}

impl RollbackToken {
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn saved_files(&self) -> usize {
        self.files.len()
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }
}

/// What a successful rollback changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackResult {
    pub categories_restored: usize,
    pub photos_restored: usize,
    pub rows_removed: usize,
    pub files_restored: usize,
    pub files_removed: usize,
}

pub struct RollbackManager {
    repos: Repositories,
    scratch_root: PathBuf,
}

impl RollbackManager {
    pub fn new(repos: Repositories, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            repos,
            scratch_root: scratch_root.into(),
        }
    }

    /// Capture current state. Files of photos stored under `photos_dir` are
    /// copied into a private scratch directory.
    pub async fn snapshot(&self, photos_dir: &Path) -> Result<RollbackToken, RollbackError> {
        let categories = self
            .repos
            .categories
            .get_all_categories()
            .await
            .map_err(RollbackError::Snapshot)?;
        let photos = self
            .repos
            .photos
            .get_all_photos()
            .await
            .map_err(RollbackError::Snapshot)?;
        let dark_mode = self
            .repos
            .theme
            .is_dark_mode()
            .await
            .map_err(RollbackError::Snapshot)?;

        let scratch = ScratchDir::create(&self.scratch_root, "rollback")
            .await
            .map_err(|e| RollbackError::Snapshot(e.into()))?;

        let mut files = Vec::new();
        for photo in &photos {
            let original = PathBuf::from(&photo.path);
            if photo.is_from_assets || !is_within(&original, photos_dir) {
                continue;
            }

            let saved = scratch
                .path()
                .join(format!("{}_{}", photo.id, photo_file_name(&photo.path, photo.id)));
            match copy_file(&original, &saved).await {
                Ok(_) => files.push((original, saved)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(photo_id = photo.id, "No file to save for rollback");
                }
                Err(e) => return Err(RollbackError::Snapshot(e.into())),
            }
        }

        info!(
            categories = categories.len(),
            photos = photos.len(),
            files = files.len(),
            "Rollback snapshot captured"
        );

        Ok(RollbackToken {
            categories,
            photos,
            dark_mode,
            files,
            scratch,
        })
    }

    /// Return the store to exactly the captured state.
    ///
    /// `created_files` are files the failed restore wrote; they are removed
    /// before saved files are put back. Every step is attempted even when an
    /// earlier one fails; failures are reported together.
    pub async fn restore(
        &self,
        token: RollbackToken,
        created_files: &[PathBuf],
    ) -> Result<RollbackResult, RollbackError> {
        let mut failures = Vec::new();
        let mut result = RollbackResult::default();

        let saved_photos: HashMap<i64, &Photo> = token.photos.iter().map(|p| (p.id, p)).collect();
        let saved_categories: HashMap<i64, &Category> =
            token.categories.iter().map(|c| (c.id, c)).collect();

        // Photos first: categories cannot go while photos reference them.
        let current_photos = match self.repos.photos.get_all_photos().await {
            Ok(photos) => photos,
            Err(e) => {
                failures.push(format!("list photos: {:#}", e));
                Vec::new()
            }
        };
        let mut intact_photos = Vec::new();
        for photo in &current_photos {
            if saved_photos.get(&photo.id) == Some(&photo) {
                intact_photos.push(photo.id);
                continue;
            }
            match self.repos.photos.delete_photo(photo.id).await {
                Ok(()) => result.rows_removed += 1,
                Err(e) => failures.push(format!("delete photo {}: {:#}", photo.id, e)),
            }
        }

        let current_categories = match self.repos.categories.get_all_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                failures.push(format!("list categories: {:#}", e));
                Vec::new()
            }
        };
        let mut present_categories = Vec::new();
        for category in current_categories.iter().filter(|c| !saved_categories.contains_key(&c.id)) {
            match self.repos.categories.delete_category(category.id).await {
                Ok(()) => result.rows_removed += 1,
                Err(e) => failures.push(format!("delete category {}: {:#}", category.id, e)),
            }
        }

        // Names are unique and may have moved between ids: park changed rows
        // under temporary names before writing the saved values back.
        let mut changed = Vec::new();
        for category in current_categories.iter() {
            let Some(saved) = saved_categories.get(&category.id) else {
                continue;
            };
            present_categories.push(category.id);
            if *saved == category {
                continue;
            }
            let parked = Category {
                name: parked_name(category.id),
                ..category.clone()
            };
            match self.repos.categories.update_category(parked).await {
                Ok(()) => changed.push(*saved),
                Err(e) => failures.push(format!("park category {}: {:#}", category.id, e)),
            }
        }
        for saved in changed {
            match self.repos.categories.update_category(saved.clone()).await {
                Ok(()) => result.categories_restored += 1,
                Err(e) => failures.push(format!("revert category {}: {:#}", saved.id, e)),
            }
        }
        for category in token.categories.iter().filter(|c| !present_categories.contains(&c.id)) {
            match self.repos.categories.insert_category(category.clone()).await {
                Ok(_) => result.categories_restored += 1,
                Err(e) => failures.push(format!("reinsert category {}: {:#}", category.id, e)),
            }
        }

        for photo in token.photos.iter().filter(|p| !intact_photos.contains(&p.id)) {
            match self.repos.photos.insert_photo(photo.clone()).await {
                Ok(_) => result.photos_restored += 1,
                Err(e) => failures.push(format!("reinsert photo {}: {:#}", photo.id, e)),
            }
        }

        for path in created_files {
            match tokio::fs::remove_file(path).await {
                Ok(()) => result.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => failures.push(format!("remove {}: {}", path.display(), e)),
            }
        }
        for (original, saved) in &token.files {
            match copy_file(saved, original).await {
                Ok(_) => result.files_restored += 1,
                Err(e) => failures.push(format!("restore {}: {}", original.display(), e)),
            }
        }

        if let Err(e) = self.repos.theme.set_dark_mode(token.dark_mode).await {
            failures.push(format!("reset theme: {:#}", e));
        }

        if failures.is_empty() {
            info!(
                categories = result.categories_restored,
                photos = result.photos_restored,
                removed = result.rows_removed,
                files = result.files_restored,
                "Rollback completed"
            );
            Ok(result)
        } else {
            for failure in &failures {
                error!("Rollback step failed: {}", failure);
            }
            warn!(failed = failures.len(), "Rollback incomplete, store may be inconsistent");
            Err(RollbackError::Incomplete { failures })
        }
    }
}

fn parked_name(id: i64) -> String {
    format!(".rollback-{}-{}", id, uuid::Uuid::new_v4().simple())
}
