//! Backup engines running against the SQLite store.

use std::path::Path;
use std::sync::Arc;

use smilepile_backup::import::RestorePhase;
use smilepile_backup::progress::{Progress, ProgressCallback};
use smilepile_backup::repository::{
    Category, CategoryRepository, Photo, PhotoRepository, ThemeStore,
};
use smilepile_backup::{
    BackupService, Config, ExportOptions, ImportError, ImportOptions, ImportStrategy, Repositories,
};
use smilepile_store::models::settings::keys;
use smilepile_store::SqliteStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn cancel_after_first_photo(cancel: &CancellationToken) -> ProgressCallback<RestorePhase> {
    let trigger = cancel.clone();
    Arc::new(move |p: &Progress<RestorePhase>| {
        if p.phase == RestorePhase::ImportingPhotos && p.processed >= 1 {
            trigger.cancel();
        }
    })
}

fn category(id: i64, name: &str, is_default: bool) -> Category {
    Category {
        id,
        name: name.to_string(),
        display_name: name.to_string(),
        position: id as i32,
        icon_resource: None,
        color_hex: Some("#E91E63".to_string()),
        is_default,
        created_at: 1_000 + id,
    }
}

async fn seed(store: &SqliteStore, photos_dir: &Path, names: [&str; 2]) -> anyhow::Result<()> {
    store.insert_category(category(1, names[0], false)).await?;
    store.insert_category(category(2, names[1], false)).await?;

    std::fs::create_dir_all(photos_dir)?;
    for (id, category_id) in [(1, 1), (2, 1), (3, 2)] {
        let path = photos_dir.join(format!("img_{}.jpg", id));
        std::fs::write(&path, vec![id as u8; 64])?;
        store
            .insert_photo(Photo {
                id,
                path: path.to_string_lossy().into_owned(),
                category_id,
                name: format!("img_{}", id),
                is_from_assets: false,
                created_at: 2_000 + id,
                file_size: 64,
                width: 8,
                height: 8,
            })
            .await?;
    }
    store.set_dark_mode(true).await?;
    store.set_pin_hash(Some("source-pin-hash")).await?;
    Ok(())
}

async fn export_source(base: &Path, names: [&str; 2]) -> anyhow::Result<std::path::PathBuf> {
    let store = Arc::new(SqliteStore::open(&base.join("smilepile.db"))?);
    seed(&store, &base.join("photos"), names).await?;

    let service = BackupService::new(Config::with_base_dir(base), Repositories::from_store(store));
    let outcome = service
        .create_backup(ExportOptions::default(), &CancellationToken::new(), None)
        .await?;
    assert_eq!(outcome.files_archived, 3);
    Ok(outcome.archive_path)
}

#[tokio::test]
async fn test_replace_restore_into_sqlite() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = export_source(&temp_dir.path().join("source"), ["family", "cars"]).await?;

    let target_base = temp_dir.path().join("target");
    let target = Arc::new(SqliteStore::open(&target_base.join("smilepile.db"))?);
    target.insert_category(category(1, "uncategorized", true)).await?;
    target.set_pin_hash(Some("target-pin-hash")).await?;

    let service = BackupService::new(
        Config::with_base_dir(&target_base),
        Repositories::from_store(target.clone()),
    );
    let options = ImportOptions {
        strategy: ImportStrategy::Replace,
        ..ImportOptions::default()
    };
    let summary = service
        .restore_from_backup(&archive, options, &CancellationToken::new(), None)
        .await?;

    assert_eq!(summary.photos_imported, 3);
    assert!(summary.source_security.has_pin);

    // The surviving default category keeps id 1, so family gets a new id.
    let categories = target.get_all_categories().await?;
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["uncategorized", "family", "cars"]);

    let family = target
        .get_category_by_name("family")
        .await?
        .ok_or_else(|| anyhow::anyhow!("family missing"))?;
    let photos = target.get_all_photos().await?;
    assert_eq!(photos.iter().filter(|p| p.category_id == family.id).count(), 2);
    for photo in &photos {
        assert_eq!(std::fs::read(&photo.path)?, vec![photo.id as u8; 64]);
    }

    assert!(target.is_dark_mode().await?);
    assert_eq!(
        target.setting(keys::PIN_HASH).await?.as_deref(),
        Some("target-pin-hash")
    );
    Ok(())
}

#[tokio::test]
async fn test_cancellation_mid_replace_rolls_back() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = export_source(&temp_dir.path().join("source"), ["family", "cars"]).await?;

    let target_base = temp_dir.path().join("target");
    let target = Arc::new(SqliteStore::open(&target_base.join("smilepile.db"))?);
    let existing = category(4, "animals", false);
    target.insert_category(existing.clone()).await?;
    let photos_dir = target_base.join("photos");
    std::fs::create_dir_all(&photos_dir)?;
    let kept = photos_dir.join("dog.jpg");
    std::fs::write(&kept, b"woof")?;
    let dog = Photo {
        id: 8,
        path: kept.to_string_lossy().into_owned(),
        category_id: 4,
        name: "dog".to_string(),
        is_from_assets: false,
        created_at: 9,
        file_size: 4,
        width: 1,
        height: 1,
    };
    target.insert_photo(dog.clone()).await?;

    let cancel = CancellationToken::new();
    let on_progress = cancel_after_first_photo(&cancel);

    let service = BackupService::new(
        Config::with_base_dir(&target_base),
        Repositories::from_store(target.clone()),
    );
    let options = ImportOptions {
        strategy: ImportStrategy::Replace,
        ..ImportOptions::default()
    };
    let result = service
        .restore_from_backup(&archive, options, &cancel, Some(on_progress))
        .await;

    match result {
        Err(ImportError::Interrupted {
            rolled_back: true,
            cause,
            ..
        }) => assert!(matches!(*cause, ImportError::Cancelled)),
        other => panic!("expected rolled back cancellation, got {:?}", other),
    }

    assert_eq!(target.get_all_categories().await?, vec![existing]);
    assert_eq!(target.get_all_photos().await?, vec![dog]);
    assert_eq!(std::fs::read(&kept)?, b"woof");
    assert!(!target.is_dark_mode().await?);
    Ok(())
}

#[tokio::test]
async fn test_rollback_after_names_moved_between_ids() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = export_source(&temp_dir.path().join("source"), ["cars", "family"]).await?;

    let target_base = temp_dir.path().join("target");
    let target = Arc::new(SqliteStore::open(&target_base.join("smilepile.db"))?);
    seed(&target, &target_base.join("photos"), ["family", "cars"]).await?;
    let categories_before = target.get_all_categories().await?;
    let photos_before = target.get_all_photos().await?;

    let cancel = CancellationToken::new();
    let service = BackupService::new(
        Config::with_base_dir(&target_base),
        Repositories::from_store(target.clone()),
    );
    let options = ImportOptions {
        strategy: ImportStrategy::Replace,
        ..ImportOptions::default()
    };
    let result = service
        .restore_from_backup(&archive, options, &cancel, Some(cancel_after_first_photo(&cancel)))
        .await;

    assert!(
        matches!(result, Err(ImportError::Interrupted { rolled_back: true, .. })),
        "expected rolled back restore, got {:?}",
        result
    );

    let categories = target.get_all_categories().await?;
    let pairs: Vec<(i64, &str)> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();
    assert_eq!(pairs, vec![(1, "family"), (2, "cars")]);
    assert_eq!(categories, categories_before);
    assert_eq!(target.get_all_photos().await?, photos_before);
    Ok(())
}
