use rusqlite::{params, Connection, OptionalExtension, Row};
use smilepile_backup::repository::Category;

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get("id")?,
        name: row.get("name")?,
        display_name: row.get("display_name")?,
        position: row.get("position")?,
        icon_resource: row.get("icon_resource")?,
        color_hex: row.get("color_hex")?,
        is_default: row.get("is_default")?,
        created_at: row.get("created_at")?,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT * FROM categories ORDER BY position, id")?;
    let rows = stmt.query_map([], row_to_category)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Category>> {
    Ok(conn
        .query_row(
            "SELECT * FROM categories WHERE name = ?",
            params![name],
            row_to_category,
        )
        .optional()?)
}

/// Insert, keeping a non-zero id. Returns the stored id.
pub fn create(conn: &Connection, category: &Category) -> anyhow::Result<i64> {
    let id = (category.id != 0).then_some(category.id);
    conn.execute(
        "INSERT INTO categories (id, name, display_name, position, icon_resource, color_hex, is_default, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            category.name,
            category.display_name,
            category.position,
            category.icon_resource,
            category.color_hex,
            category.is_default,
            category.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update(conn: &Connection, category: &Category) -> anyhow::Result<()> {
    let changed = conn.execute(
        "UPDATE categories SET name = ?2, display_name = ?3, position = ?4, icon_resource = ?5,
         color_hex = ?6, is_default = ?7, created_at = ?8 WHERE id = ?1",
        params![
            category.id,
            category.name,
            category.display_name,
            category.position,
            category.icon_resource,
            category.color_hex,
            category.is_default,
            category.created_at,
        ],
    )?;
    if changed == 0 {
        anyhow::bail!("category {} not found", category.id);
    }
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute("DELETE FROM categories WHERE id = ?", params![id])?;
    Ok(())
}
