//! Collaborator interfaces the backup engines depend on.
//!
//! The engines never reach storage directly; they are handed a
//! [`Repositories`] bundle at construction. Methods return boxed futures so
//! the traits stay object safe behind `Arc<dyn ...>`.

pub mod memory;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A photo category ("pile") as stored by the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// 0 on insert means "assign a new id"
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub position: i32,
    pub icon_resource: Option<String>,
    pub color_hex: Option<String>,
    pub is_default: bool,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// A photo record as stored by the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// 0 on insert means "assign a new id"
    pub id: i64,
    pub path: String,
    pub category_id: i64,
    pub name: String,
    pub is_from_assets: bool,
    /// Epoch milliseconds
    pub created_at: i64,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
}

/// Read-only presence flags for the app's protection features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIndicators {
    pub has_pin: bool,
    pub has_pattern: bool,
    pub kid_safe_mode_enabled: bool,
    pub delete_protection_enabled: bool,
}

pub trait CategoryRepository: Send + Sync {
    fn get_all_categories(&self) -> BoxFuture<'_, anyhow::Result<Vec<Category>>>;

    fn get_category_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<Category>>>;

    /// Insert and return the stored id. A non-zero `id` must be preserved or
    /// the insert fails.
    fn insert_category(&self, category: Category) -> BoxFuture<'_, anyhow::Result<i64>>;

    fn update_category(&self, category: Category) -> BoxFuture<'_, anyhow::Result<()>>;

    fn delete_category(&self, id: i64) -> BoxFuture<'_, anyhow::Result<()>>;
}

pub trait PhotoRepository: Send + Sync {
    fn get_all_photos(&self) -> BoxFuture<'_, anyhow::Result<Vec<Photo>>>;

    /// Insert and return the stored id, same id rule as categories.
    fn insert_photo(&self, photo: Photo) -> BoxFuture<'_, anyhow::Result<i64>>;

    fn delete_photo(&self, id: i64) -> BoxFuture<'_, anyhow::Result<()>>;
}

pub trait ThemeStore: Send + Sync {
    fn is_dark_mode(&self) -> BoxFuture<'_, anyhow::Result<bool>>;

    fn set_dark_mode(&self, enabled: bool) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Source of [`SecurityIndicators`]. There is no write path.
pub trait SecurityIndicatorSource: Send + Sync {
    fn security_indicators(&self) -> BoxFuture<'_, anyhow::Result<SecurityIndicators>>;
}

/// Handles to every collaborator the engines use.
#[derive(Clone)]
pub struct Repositories {
    pub categories: Arc<dyn CategoryRepository>,
    pub photos: Arc<dyn PhotoRepository>,
    pub theme: Arc<dyn ThemeStore>,
    pub security: Arc<dyn SecurityIndicatorSource>,
}

impl Repositories {
    /// Use one store for all four roles.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: CategoryRepository + PhotoRepository + ThemeStore + SecurityIndicatorSource + 'static,
    {
        Self {
            categories: store.clone(),
            photos: store.clone(),
            theme: store.clone(),
            security: store,
        }
    }
}
