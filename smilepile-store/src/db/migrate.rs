use crate::db::connection::DbPool;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  display_name TEXT NOT NULL,
  position INTEGER NOT NULL DEFAULT 0,
  icon_resource TEXT,
  color_hex TEXT,
  is_default INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS photos (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  path TEXT NOT NULL,
  category_id INTEGER NOT NULL REFERENCES categories(id),
  name TEXT NOT NULL DEFAULT '',
  is_from_assets INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL,
  file_size INTEGER NOT NULL DEFAULT 0,
  width INTEGER NOT NULL DEFAULT 0,
  height INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_photos_category_id ON photos(category_id);
CREATE INDEX IF NOT EXISTS idx_categories_position ON categories(position);
"#;

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        anyhow::bail!(
            "database schema version {} is newer than supported version {}",
            version,
            SCHEMA_VERSION
        );
    }

    conn.execute_batch(SCHEMA)?;
    conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_memory_pool;

    #[test]
    fn test_migrate_is_idempotent() -> anyhow::Result<()> {
        let pool = create_memory_pool()?;
        migrate(&pool)?;
        migrate(&pool)?;

        let conn = pool.get()?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('categories', 'photos', 'settings')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 3);
        Ok(())
    }

    #[test]
    fn test_newer_schema_is_refused() -> anyhow::Result<()> {
        let pool = create_memory_pool()?;
        pool.get()?.execute_batch("PRAGMA user_version = 99")?;
        assert!(migrate(&pool).is_err());
        Ok(())
    }
}
