//! Directory traversal for archive creation.
//!
//! Produces a deterministic, sorted listing of a staging tree so that the
//! order of entries inside an archive is reproducible.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Which staged entries to leave out of an archive
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Exact file names to skip (OS clutter)
    pub exclude_names: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            exclude_names: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
        }
    }
}

/// A staged file or directory
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,

    /// Path below the staging root
    pub relative_path: PathBuf,

    /// 0 for directories
    pub size: u64,

    pub is_dir: bool,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry. Symlinks are never followed or
    /// returned.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        if entry.path_is_symlink() {
            return Ok(None);
        }

        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Some(Self {
            path,
            relative_path,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
        }))
    }

    /// Entry name inside an archive: `/`-separated, directories end in `/`.
    pub fn archive_name(&self) -> String {
        let name = self
            .relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if self.is_dir {
            format!("{}/", name)
        } else {
            name
        }
    }
}

/// Walk a directory tree and collect files and directories, sorted by name
/// at every level. The root itself is not returned.
///
/// # Example
/// ```no_run
/// use smilepile_backup::fs::walker::{walk_directory, WalkOptions};
/// use std::path::Path;
///
/// let entries = walk_directory(Path::new("/tmp/staging"), WalkOptions::default()).unwrap();
/// println!("Found {} entries", entries.len());
/// ```
pub fn walk_directory(root: &Path, options: WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;

        if is_excluded(&entry, &options.exclude_names) {
            continue;
        }

        if let Some(info) = FileInfo::from_entry(&entry, root)? {
            entries.push(info);
        }
    }

    Ok(entries)
}

fn is_excluded(entry: &DirEntry, names: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    names.iter().any(|n| file_name == n.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let entries = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_is_sorted_and_includes_directories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("photos"))?;
        fs::write(temp_dir.path().join("photos/2_b.jpg"), b"bb")?;
        fs::write(temp_dir.path().join("photos/1_a.jpg"), b"a")?;
        fs::write(temp_dir.path().join("metadata.json"), b"{}")?;

        let names: Vec<String> = walk_directory(temp_dir.path(), WalkOptions::default())?
            .iter()
            .map(|e| e.archive_name())
            .collect();

        assert_eq!(
            names,
            vec!["metadata.json", "photos/", "photos/1_a.jpg", "photos/2_b.jpg"]
        );
        Ok(())
    }

    #[test]
    fn test_sizes_reported_for_files_only() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("sub"))?;
        fs::write(temp_dir.path().join("sub/file.txt"), b"1234567")?;

        let entries = walk_directory(temp_dir.path(), WalkOptions::default())?;
        let sizes: Vec<(bool, u64)> = entries.iter().map(|e| (e.is_dir, e.size)).collect();
        assert_eq!(sizes, vec![(true, 0), (false, 7)]);
        Ok(())
    }

    #[test]
    fn test_os_clutter_is_excluded() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file.txt"), b"keep")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"exclude")?;

        let entries = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path.to_str().unwrap(), "file.txt");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_are_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("real.txt"), b"data")?;
        std::os::unix::fs::symlink("/etc/passwd", temp_dir.path().join("link"))?;

        let entries = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(entries.len(), 1);
        Ok(())
    }
}
