use rusqlite::{params, Connection, Row};
use smilepile_backup::repository::Photo;

fn row_to_photo(row: &Row) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get("id")?,
        path: row.get("path")?,
        category_id: row.get("category_id")?,
        name: row.get("name")?,
        is_from_assets: row.get("is_from_assets")?,
        created_at: row.get("created_at")?,
        file_size: row.get::<_, i64>("file_size")?.max(0) as u64,
        width: row.get("width")?,
        height: row.get("height")?,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<Photo>> {
    let mut stmt = conn.prepare("SELECT * FROM photos ORDER BY id")?;
    let rows = stmt.query_map([], row_to_photo)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn count_in_category(conn: &Connection, category_id: i64) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM photos WHERE category_id = ?",
        params![category_id],
        |row| row.get(0),
    )?)
}

/// Insert, keeping a non-zero id. Returns the stored id.
pub fn create(conn: &Connection, photo: &Photo) -> anyhow::Result<i64> {
    let id = (photo.id != 0).then_some(photo.id);
    let file_size = i64::try_from(photo.file_size)?;
    conn.execute(
        "INSERT INTO photos (id, path, category_id, name, is_from_assets, created_at, file_size, width, height)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            photo.path,
            photo.category_id,
            photo.name,
            photo.is_from_assets,
            photo.created_at,
            file_size,
            photo.width,
            photo.height,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute("DELETE FROM photos WHERE id = ?", params![id])?;
    Ok(())
}
