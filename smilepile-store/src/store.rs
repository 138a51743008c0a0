//! Collaborator trait implementations over the SQLite pool.
//!
//! Every call checks out a pooled connection on the blocking thread pool.

use futures_util::future::BoxFuture;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

use smilepile_backup::repository::{
    Category, CategoryRepository, Photo, PhotoRepository, SecurityIndicatorSource,
    SecurityIndicators, ThemeStore,
};

use crate::db::connection::{create_memory_pool, create_pool, DbPool};
use crate::db::migrate::migrate;
use crate::models::settings::keys;
use crate::models::{category, photo, settings};

#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_pool(create_pool(path)?)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_pool(create_memory_pool()?)
    }

    pub fn from_pool(pool: DbPool) -> anyhow::Result<Self> {
        migrate(&pool)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&*conn)
        })
        .await?
    }

    pub async fn setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| settings::get(conn, &key)).await
    }

    /// Store or clear the PIN hash. Only the host app's lock screen writes
    /// this; the backup engines see nothing but its presence.
    pub async fn set_pin_hash(&self, hash: Option<&str>) -> anyhow::Result<()> {
        let hash = hash.map(str::to_string);
        self.with_conn(move |conn| match hash {
            Some(hash) => settings::set(conn, keys::PIN_HASH, &hash),
            None => settings::delete(conn, keys::PIN_HASH),
        })
        .await
    }

    pub async fn set_protection(&self, kid_safe_mode: bool, delete_protection: bool) -> anyhow::Result<()> {
        self.with_conn(move |conn| {
            settings::set_flag(conn, keys::KID_SAFE_MODE, kid_safe_mode)?;
            settings::set_flag(conn, keys::DELETE_PROTECTION, delete_protection)
        })
        .await
    }
}

impl CategoryRepository for SqliteStore {
    fn get_all_categories(&self) -> BoxFuture<'_, anyhow::Result<Vec<Category>>> {
        Box::pin(self.with_conn(category::find_all))
    }

    fn get_category_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<Category>>> {
        let name = name.to_string();
        Box::pin(self.with_conn(move |conn| category::find_by_name(conn, &name)))
    }

    fn insert_category(&self, category: Category) -> BoxFuture<'_, anyhow::Result<i64>> {
        Box::pin(async move {
            let id = self
                .with_conn(move |conn| category::create(conn, &category))
                .await?;
            debug!(category_id = id, "Inserted category");
            Ok(id)
        })
    }

    fn update_category(&self, category: Category) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.with_conn(move |conn| category::update(conn, &category)))
    }

    fn delete_category(&self, id: i64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.with_conn(move |conn| {
            let photos = photo::count_in_category(conn, id)?;
            if photos > 0 {
                anyhow::bail!("category {} still has {} photo(s)", id, photos);
            }
            category::delete(conn, id)
        }))
    }
}

impl PhotoRepository for SqliteStore {
    fn get_all_photos(&self) -> BoxFuture<'_, anyhow::Result<Vec<Photo>>> {
        Box::pin(self.with_conn(photo::find_all))
    }

    fn insert_photo(&self, photo: Photo) -> BoxFuture<'_, anyhow::Result<i64>> {
        Box::pin(async move {
            let id = self.with_conn(move |conn| photo::create(conn, &photo)).await?;
            debug!(photo_id = id, "Inserted photo");
            Ok(id)
        })
    }

    fn delete_photo(&self, id: i64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.with_conn(move |conn| photo::delete(conn, id)))
    }
}

impl ThemeStore for SqliteStore {
    fn is_dark_mode(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(self.with_conn(|conn| settings::get_flag(conn, keys::DARK_MODE)))
    }

    fn set_dark_mode(&self, enabled: bool) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.with_conn(move |conn| settings::set_flag(conn, keys::DARK_MODE, enabled)))
    }
}

impl SecurityIndicatorSource for SqliteStore {
    fn security_indicators(&self) -> BoxFuture<'_, anyhow::Result<SecurityIndicators>> {
        Box::pin(self.with_conn(|conn| {
            Ok(SecurityIndicators {
                has_pin: settings::exists(conn, keys::PIN_HASH)?,
                has_pattern: settings::exists(conn, keys::PATTERN_HASH)?,
                kid_safe_mode_enabled: settings::get_flag(conn, keys::KID_SAFE_MODE)?,
                delete_protection_enabled: settings::get_flag(conn, keys::DELETE_PROTECTION)?,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
            display_name: name.to_uppercase(),
            position: 3,
            icon_resource: Some("ic_pets".to_string()),
            color_hex: None,
            is_default: false,
            created_at: 42,
        }
    }

    fn photo(id: i64, category_id: i64) -> Photo {
        Photo {
            id,
            path: format!("/photos/{}.jpg", id),
            category_id,
            name: format!("{}.jpg", id),
            is_from_assets: false,
            created_at: 7,
            file_size: 1024,
            width: 800,
            height: 600,
        }
    }

    #[tokio::test]
    async fn test_ids_are_preserved_or_assigned() -> anyhow::Result<()> {
        let store = SqliteStore::open_in_memory()?;

        assert_eq!(store.insert_category(category(5, "animals")).await?, 5);
        assert_eq!(store.insert_category(category(0, "family")).await?, 6);
        assert!(store.insert_category(category(5, "again")).await.is_err());
        assert!(store.insert_category(category(0, "animals")).await.is_err());

        assert_eq!(store.insert_photo(photo(9, 5)).await?, 9);
        assert_eq!(store.get_all_photos().await?, vec![photo(9, 5)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_photo_requires_existing_category() -> anyhow::Result<()> {
        let store = SqliteStore::open_in_memory()?;
        assert!(store.insert_photo(photo(1, 77)).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_category_with_photos_cannot_be_deleted() -> anyhow::Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.insert_category(category(1, "animals")).await?;
        store.insert_photo(photo(1, 1)).await?;

        assert!(store.delete_category(1).await.is_err());
        store.delete_photo(1).await?;
        store.delete_category(1).await?;
        assert!(store.get_all_categories().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_lookup_by_name() -> anyhow::Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.insert_category(category(1, "animals")).await?;

        let mut changed = category(1, "animals");
        changed.is_default = true;
        changed.color_hex = Some("#FFFFFF".to_string());
        store.update_category(changed.clone()).await?;

        assert_eq!(store.get_category_by_name("animals").await?, Some(changed));
        assert_eq!(store.get_category_by_name("cars").await?, None);
        assert!(store.update_category(category(2, "cars")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_security_indicators_only_reveal_presence() -> anyhow::Result<()> {
        let store = SqliteStore::open_in_memory()?;
        assert_eq!(store.security_indicators().await?, SecurityIndicators::default());

        store.set_pin_hash(Some("c0ffee")).await?;
        store.set_protection(true, false).await?;
        let indicators = store.security_indicators().await?;
        assert!(indicators.has_pin);
        assert!(!indicators.has_pattern);
        assert!(indicators.kid_safe_mode_enabled);
        assert!(!indicators.delete_protection_enabled);

        store.set_dark_mode(true).await?;
        assert!(store.is_dark_mode().await?);
        assert_eq!(store.setting(keys::DARK_MODE).await?.as_deref(), Some("true"));
        Ok(())
    }
}
