//! Photo file helpers shared by export, restore and rollback.

use std::path::{Path, PathBuf};

/// Reduce a file name to a portable, single-component form.
///
/// Only ASCII alphanumerics, `.`, `-` and `_` survive; anything else becomes
/// `_`. Leading dots are stripped so the result is never hidden or `..`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "photo".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File name of a stored photo path, sanitized; falls back to `photo_<id>.jpg`.
pub fn photo_file_name(path: &str, photo_id: i64) -> String {
    Path::new(path)
        .file_name()
        .map(|n| sanitize_file_name(&n.to_string_lossy()))
        .unwrap_or_else(|| format!("photo_{}.jpg", photo_id))
}

/// Deterministic name for a photo inside an archive or the photo store:
/// `<id>_<fileName>`.
pub fn stored_photo_name(photo_id: i64, file_name: &str) -> String {
    format!("{}_{}", photo_id, sanitize_file_name(file_name))
}

/// Copy a file, creating the destination's parent directories.
pub async fn copy_file(src: &Path, dst: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(src, dst).await
}

/// Whether `path` lives under `root` (lexically, without touching the disk).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Remove a directory tree, ignoring a directory that is already gone.
pub async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Unique child directory name under `root`, e.g. `export-<uuid>`.
pub fn unique_dir(root: &Path, prefix: &str) -> PathBuf {
    root.join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}
