//! Archive creation from a staging directory.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::errors::ArchiveError;

/// Write every file and directory under `source_dir` into a new ZIP at
/// `destination`, preserving relative paths.
///
/// `on_progress` receives `(entries_written, total_entries, message)`. On
/// failure the partially written file is left for the caller to remove.
pub fn create_archive(
    source_dir: &Path,
    destination: &Path,
    cancel: &CancellationToken,
    on_progress: &mut dyn FnMut(usize, usize, &str),
) -> Result<PathBuf, ArchiveError> {
    create_archive_with_level(source_dir, destination, None, cancel, on_progress)
}

/// [`create_archive`] with an explicit deflate level (`None` = library default).
pub fn create_archive_with_level(
    source_dir: &Path,
    destination: &Path,
    compression_level: Option<i64>,
    cancel: &CancellationToken,
    on_progress: &mut dyn FnMut(usize, usize, &str),
) -> Result<PathBuf, ArchiveError> {
    let entries = walk_directory(source_dir, WalkOptions::default())?;
    let total = entries.len();

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let options: FileOptions<'_, ()> = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(compression_level)
        .unix_permissions(0o644);
    let dir_options: FileOptions<'_, ()> = FileOptions::default().unix_permissions(0o755);

    for (written, entry) in entries.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        let name = entry.archive_name();
        if entry.is_dir {
            zip.add_directory(name.as_str(), dir_options)
                .map_err(write_error)?;
        } else {
            zip.start_file(name.as_str(), options).map_err(write_error)?;
            let mut reader = BufReader::new(File::open(&entry.path)?);
            std::io::copy(&mut reader, &mut zip)?;
        }

        debug!(entry = %name, bytes = entry.size, "Added archive entry");
        on_progress(written + 1, total, &name);
    }

    let mut inner = zip.finish().map_err(write_error)?;
    std::io::Write::flush(&mut inner)?;

    info!(
        path = %destination.display(),
        entries = total,
        "Archive written"
    );

    Ok(destination.to_path_buf())
}

fn write_error(err: zip::result::ZipError) -> ArchiveError {
    ArchiveError::Write(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_archive_preserves_layout() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let staging = temp_dir.path().join("staging");
        fs::create_dir_all(staging.join("photos"))?;
        fs::write(staging.join("metadata.json"), b"{}")?;
        fs::write(staging.join("photos/1_a.jpg"), b"jpeg-bytes")?;

        let output = temp_dir.path().join("out/backup.zip");
        let mut calls = Vec::new();
        let path = create_archive(
            &staging,
            &output,
            &CancellationToken::new(),
            &mut |done, total, name| calls.push((done, total, name.to_string())),
        )?;

        assert_eq!(path, output);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.last().map(|c| (c.0, c.1)), Some((3, 3)));

        let mut archive = zip::ZipArchive::new(File::open(&output)?)?;
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert!(names.contains(&"metadata.json".to_string()));
        assert!(names.contains(&"photos/".to_string()));
        assert!(names.contains(&"photos/1_a.jpg".to_string()));

        let mut content = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("photos/1_a.jpg")?, &mut content)?;
        assert_eq!(content, "jpeg-bytes");

        Ok(())
    }

    #[test]
    fn test_create_archive_honours_cancellation() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let out_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"a")?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = create_archive(
            temp_dir.path(),
            &out_dir.path().join("cancelled.zip"),
            &cancel,
            &mut |_, _, _| {},
        );
        assert!(matches!(result, Err(ArchiveError::Cancelled)));
        Ok(())
    }
}
