//! Scoped scratch space.
//!
//! Staging, extraction and rollback directories belong to exactly one
//! in-flight operation. These guards remove them on every exit path,
//! including early returns and cancellation.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::files::{remove_dir_if_exists, unique_dir};

/// A uniquely named directory removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    /// Create `<root>/<prefix>-<uuid>`.
    pub async fn create(root: &Path, prefix: &str) -> std::io::Result<Self> {
        let path = unique_dir(root, prefix);
        tokio::fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "Created scratch directory");
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, reporting failure instead of logging it.
    pub async fn remove(mut self) -> std::io::Result<()> {
        self.armed = false;
        remove_dir_if_exists(&self.path).await
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove scratch directory: {}", e),
        }
    }
}

/// An output file deleted on drop unless [`PartialFile::keep`] is called.
#[derive(Debug)]
pub struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file is complete; leave it in place.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove partial file: {}", e),
        }
    }
}
