//! Restore strategies and the per-item decisions they imply.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::repository::Category;

/// How incoming backup data interacts with existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStrategy {
    /// Delete current photos and non-default categories, then insert the
    /// backup with its ids. Protected by a rollback snapshot.
    Replace,
    /// Update categories matched by name, insert the rest, skip duplicate
    /// photos.
    ///
    /// A photo is a duplicate when a stored photo already has the path it
    /// would be restored to, `<photos_dir>/<backupId>_<fileName>`. Merging a
    /// backup back into the device that made it therefore adds a second copy
    /// of every photo whose original path was anything else, such as a
    /// camera roll path or a photo store file not yet named that way.
    #[default]
    Merge,
    /// Insert only what does not exist yet; never update.
    Skip,
}

impl ImportStrategy {
    /// Whether existing data is deleted before new data is written.
    pub fn is_destructive(&self) -> bool {
        matches!(self, ImportStrategy::Replace)
    }

    /// Whether backup ids are kept on insert.
    pub fn preserves_ids(&self) -> bool {
        matches!(self, ImportStrategy::Replace)
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStrategy::Replace => write!(f, "REPLACE"),
            ImportStrategy::Merge => write!(f, "MERGE"),
            ImportStrategy::Skip => write!(f, "SKIP"),
        }
    }
}

/// What to do with one backup category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CategoryAction {
    Insert,
    /// Overwrite the existing row, keeping its id and default flag
    Update { existing_id: i64, keep_default: bool },
    Keep { existing_id: i64 },
}

/// Decide for a backup category given the store's category of the same name.
///
/// Under REPLACE only default categories survive the purge, so a match is a
/// default category and is updated in place.
pub(crate) fn category_action(strategy: ImportStrategy, existing: Option<&Category>) -> CategoryAction {
    match (strategy, existing) {
        (_, None) => CategoryAction::Insert,
        (ImportStrategy::Skip, Some(current)) => CategoryAction::Keep {
            existing_id: current.id,
        },
        (ImportStrategy::Replace | ImportStrategy::Merge, Some(current)) => CategoryAction::Update {
            existing_id: current.id,
            keep_default: current.is_default,
        },
    }
}

/// Pick the category that receives photos whose category is not in the
/// backup: the lowest-position default category, else the lowest-position
/// category.
pub(crate) fn fallback_category(categories: &[Category]) -> Option<i64> {
    categories
        .iter()
        .filter(|c| c.is_default)
        .min_by_key(|c| (c.position, c.id))
        .or_else(|| categories.iter().min_by_key(|c| (c.position, c.id)))
        .map(|c| c.id)
}
