use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

// Foreign keys are per connection, so every pooled connection gets them.
fn configure(manager: SqliteConnectionManager) -> SqliteConnectionManager {
    manager.with_init(|conn| {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = FULL;",
        )
    })
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    let manager = configure(SqliteConnectionManager::file(db_path));
    let pool = Pool::builder().max_size(4).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode = DELETE;")?;

    Ok(pool)
}

/// Single-connection pool over an in-memory database. Each in-memory
/// connection is its own database, hence the size of one.
pub fn create_memory_pool() -> anyhow::Result<DbPool> {
    let manager = configure(SqliteConnectionManager::memory());
    Ok(Pool::builder().max_size(1).build(manager)?)
}
