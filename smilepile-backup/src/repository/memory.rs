//! In-memory store implementing every collaborator trait.
//!
//! Used by hosts without a database and by tests. Inserts can be made to
//! fail after a number of successes to exercise rollback.

use anyhow::{anyhow, bail};
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{
    Category, CategoryRepository, Photo, PhotoRepository, SecurityIndicatorSource,
    SecurityIndicators, ThemeStore,
};

#[derive(Debug, Default)]
struct Inner {
    categories: BTreeMap<i64, Category>,
    photos: BTreeMap<i64, Photo>,
    next_category_id: i64,
    next_photo_id: i64,
    dark_mode: bool,
    pin: Option<String>,
    indicators: SecurityIndicators,
    fail_category_inserts_after: Option<usize>,
    fail_photo_inserts_after: Option<usize>,
    fail_theme_writes: bool,
    category_inserts: usize,
    photo_inserts: usize,
}

/// Thread-safe in-memory app store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Fail the category insert that follows `count` more successful ones.
    /// The failure fires once.
    pub fn fail_category_inserts_after(&self, count: Option<usize>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_category_inserts_after = count;
            inner.category_inserts = 0;
        }
    }

    /// Fail the photo insert that follows `count` more successful ones.
    /// The failure fires once.
    pub fn fail_photo_inserts_after(&self, count: Option<usize>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_photo_inserts_after = count;
            inner.photo_inserts = 0;
        }
    }

    /// Make every dark-mode write fail.
    pub fn fail_theme_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_theme_writes = fail;
        }
    }

    /// Set the unlock PIN. The backup engines can observe only that one is set.
    pub fn set_pin(&self, pin: Option<&str>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.pin = pin.map(String::from);
        }
    }

    pub fn pin(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|inner| inner.pin.clone())
    }

    /// Override the non-PIN indicators.
    pub fn set_indicators(&self, indicators: SecurityIndicators) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.indicators = indicators;
        }
    }

    /// Snapshot of all categories in id order.
    pub fn categories(&self) -> Vec<Category> {
        self.inner
            .lock()
            .map(|inner| inner.categories.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of all photos in id order.
    pub fn photos(&self) -> Vec<Photo> {
        self.inner
            .lock()
            .map(|inner| inner.photos.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dark_mode(&self) -> bool {
        self.inner.lock().map(|inner| inner.dark_mode).unwrap_or(false)
    }
}

impl Inner {
    fn allocate(next: &mut i64, requested: i64) -> i64 {
        let id = if requested == 0 { (*next).max(1) } else { requested };
        *next = (*next).max(id + 1);
        id
    }
}

impl CategoryRepository for MemoryStore {
    fn get_all_categories(&self) -> BoxFuture<'_, anyhow::Result<Vec<Category>>> {
        Box::pin(async move { Ok(self.lock()?.categories.values().cloned().collect()) })
    }

    fn get_category_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<Category>>> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .categories
                .values()
                .find(|c| c.name == name)
                .cloned())
        })
    }

    fn insert_category(&self, mut category: Category) -> BoxFuture<'_, anyhow::Result<i64>> {
        Box::pin(async move {
            let mut inner = self.lock()?;

            if let Some(limit) = inner.fail_category_inserts_after {
                if inner.category_inserts >= limit {
                    inner.fail_category_inserts_after = None;
                    bail!("injected failure inserting category '{}'", category.name);
                }
            }
            if category.id != 0 && inner.categories.contains_key(&category.id) {
                bail!("category id {} already exists", category.id);
            }
            if inner.categories.values().any(|c| c.name == category.name) {
                bail!("category name '{}' already exists", category.name);
            }

            let id = Inner::allocate(&mut inner.next_category_id, category.id);
            category.id = id;
            inner.categories.insert(id, category);
            inner.category_inserts += 1;
            Ok(id)
        })
    }

    fn update_category(&self, category: Category) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            if inner
                .categories
                .values()
                .any(|c| c.id != category.id && c.name == category.name)
            {
                bail!("category name '{}' already exists", category.name);
            }
            match inner.categories.get_mut(&category.id) {
                Some(existing) => {
                    *existing = category;
                    Ok(())
                }
                None => bail!("category {} not found", category.id),
            }
        })
    }

    fn delete_category(&self, id: i64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            if inner.photos.values().any(|p| p.category_id == id) {
                bail!("category {} still has photos", id);
            }
            inner.categories.remove(&id);
            Ok(())
        })
    }
}

impl PhotoRepository for MemoryStore {
    fn get_all_photos(&self) -> BoxFuture<'_, anyhow::Result<Vec<Photo>>> {
        Box::pin(async move { Ok(self.lock()?.photos.values().cloned().collect()) })
    }

    fn insert_photo(&self, mut photo: Photo) -> BoxFuture<'_, anyhow::Result<i64>> {
        Box::pin(async move {
            let mut inner = self.lock()?;

            if let Some(limit) = inner.fail_photo_inserts_after {
                if inner.photo_inserts >= limit {
                    inner.fail_photo_inserts_after = None;
                    bail!("injected failure inserting photo '{}'", photo.name);
                }
            }
            if photo.id != 0 && inner.photos.contains_key(&photo.id) {
                bail!("photo id {} already exists", photo.id);
            }
            if !inner.categories.contains_key(&photo.category_id) {
                bail!("photo references unknown category {}", photo.category_id);
            }

            let id = Inner::allocate(&mut inner.next_photo_id, photo.id);
            photo.id = id;
            inner.photos.insert(id, photo);
            inner.photo_inserts += 1;
            Ok(id)
        })
    }

    fn delete_photo(&self, id: i64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lock()?.photos.remove(&id);
            Ok(())
        })
    }
}

impl ThemeStore for MemoryStore {
    fn is_dark_mode(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move { Ok(self.lock()?.dark_mode) })
    }

    fn set_dark_mode(&self, enabled: bool) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            if inner.fail_theme_writes {
                bail!("injected failure writing theme");
            }
            inner.dark_mode = enabled;
            Ok(())
        })
    }
}

impl SecurityIndicatorSource for MemoryStore {
    fn security_indicators(&self) -> BoxFuture<'_, anyhow::Result<SecurityIndicators>> {
        Box::pin(async move {
            let inner = self.lock()?;
            Ok(SecurityIndicators {
                has_pin: inner.pin.is_some(),
                ..inner.indicators
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str) -> Category {
        Category {
            id: 0,
            name: name.to_string(),
            display_name: name.to_string(),
            position: 0,
            icon_resource: None,
            color_hex: None,
            is_default: false,
            created_at: 0,
        }
    }

    fn photo(category_id: i64, path: &str) -> Photo {
        Photo {
            id: 0,
            path: path.to_string(),
            category_id,
            name: "p".into(),
            is_from_assets: false,
            created_at: 0,
            file_size: 0,
            width: 0,
            height: 0,
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_and_preserved() -> anyhow::Result<()> {
        let store = MemoryStore::new();

        let auto = store.insert_category(category("a")).await?;
        let explicit = store
            .insert_category(Category {
                id: 10,
                ..category("b")
            })
            .await?;
        let next = store.insert_category(category("c")).await?;

        assert_eq!(auto, 1);
        assert_eq!(explicit, 10);
        assert_eq!(next, 11);
        assert!(store
            .insert_category(Category {
                id: 10,
                ..category("d")
            })
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_names_are_unique() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.insert_category(category("family")).await?;
        assert!(store.insert_category(category("family")).await.is_err());
        assert!(store.get_category_by_name("family").await?.is_some());
        assert!(store.get_category_by_name("cars").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_photo_insert_failure_injection() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let cat = store.insert_category(category("a")).await?;

        store.fail_photo_inserts_after(Some(1));
        store.insert_photo(photo(cat, "/1.jpg")).await?;
        assert!(store.insert_photo(photo(cat, "/2.jpg")).await.is_err());

        // One-shot: the retry goes through.
        store.insert_photo(photo(cat, "/2.jpg")).await?;
        assert_eq!(store.photos().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_category_with_photos_cannot_be_deleted() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let cat = store.insert_category(category("a")).await?;
        let photo_id = store.insert_photo(photo(cat, "/1.jpg")).await?;

        assert!(store.delete_category(cat).await.is_err());
        store.delete_photo(photo_id).await?;
        store.delete_category(cat).await?;
        assert!(store.categories().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_pin_is_only_visible_as_indicator() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert!(!store.security_indicators().await?.has_pin);

        store.set_pin(Some("1234"));
        assert!(store.security_indicators().await?.has_pin);
        assert_eq!(store.pin().as_deref(), Some("1234"));
        Ok(())
    }
}
