use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Well-known setting keys.
pub mod keys {
    pub const DARK_MODE: &str = "ui.dark_mode";
    pub const PIN_HASH: &str = "security.pin_hash";
    pub const PATTERN_HASH: &str = "security.pattern_hash";
    pub const KID_SAFE_MODE: &str = "security.kid_safe_mode";
    pub const DELETE_PROTECTION: &str = "security.delete_protection";
}

pub fn get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
    Ok(())
}

pub fn exists(conn: &Connection, key: &str) -> anyhow::Result<bool> {
    Ok(get(conn, key)?.is_some())
}

/// Boolean setting stored as JSON; absent means false.
pub fn get_flag(conn: &Connection, key: &str) -> anyhow::Result<bool> {
    match get(conn, key)? {
        Some(value) => Ok(serde_json::from_str(&value)?),
        None => Ok(false),
    }
}

pub fn set_flag(conn: &Connection, key: &str, value: bool) -> anyhow::Result<()> {
    set(conn, key, &serde_json::to_string(&value)?)
}

pub fn get_all(conn: &Connection) -> anyhow::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut map = HashMap::new();
    for r in rows {
        let (k, v) = r?;
        map.insert(k, v);
    }
    Ok(map)
}
