//! Two-pass archive extraction.
//!
//! Pass 1 ([`inspect_archive`]) reads only the central directory and rejects
//! the archive before a single byte reaches the destination. Pass 2
//! ([`extract_archive`]) re-opens the file and streams contents, trusting
//! nothing it was told in pass 1 about sizes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::sanitize::sanitize_entry_name;
use super::{ArchiveInventory, ArchiveLimits, ExtractionResult, InventoryEntry};
use crate::utils::errors::ArchiveError;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, ArchiveError> {
    let file = File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Pass 1: validate every entry against `limits` without extracting.
///
/// Per entry the checks run in a fixed order: path, symlink, compression
/// ratio, running total. The entry count is checked up front from the
/// central directory.
pub fn inspect_archive(
    source: &Path,
    limits: &ArchiveLimits,
    cancel: &CancellationToken,
) -> Result<ArchiveInventory, ArchiveError> {
    let mut archive = open_archive(source)?;

    let count = archive.len();
    if count > limits.max_entries {
        warn!(entries = count, limit = limits.max_entries, "Archive rejected: too many entries");
        return Err(ArchiveError::TooManyEntries {
            count,
            limit: limits.max_entries,
        });
    }

    let mut inventory = ArchiveInventory::default();

    for index in 0..count {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();

        let path = sanitize_entry_name(&name)?;

        if let Some(mode) = entry.unix_mode() {
            if mode & S_IFMT == S_IFLNK {
                return Err(ArchiveError::UnsupportedEntry {
                    entry: name,
                    reason: "symbolic link".to_string(),
                });
            }
        }

        let size = entry.size();
        let compressed_size = entry.compressed_size();

        if size >= limits.ratio_check_min_bytes {
            let ratio = if compressed_size == 0 {
                u64::MAX
            } else {
                size / compressed_size
            };
            if compressed_size == 0 || ratio > limits.max_compression_ratio {
                warn!(entry = %name, size, compressed_size, "Archive rejected: compression bomb");
                return Err(ArchiveError::CompressionBomb {
                    entry: name,
                    ratio,
                    limit: limits.max_compression_ratio,
                });
            }
        }

        inventory.total_declared = inventory.total_declared.saturating_add(size);
        if inventory.total_declared > limits.max_total_uncompressed {
            warn!(total = inventory.total_declared, "Archive rejected: size quota exceeded");
            return Err(ArchiveError::QuotaExceeded {
                total: inventory.total_declared,
                limit: limits.max_total_uncompressed,
            });
        }

        inventory.entries.push(InventoryEntry {
            index,
            is_dir: entry.is_dir(),
            name,
            path,
            size,
            compressed_size,
        });
    }

    debug!(
        entries = inventory.entries.len(),
        declared_bytes = inventory.total_declared,
        "Archive passed inspection"
    );

    Ok(inventory)
}

/// Validate then extract `source` into `destination`.
///
/// `destination` is only created once pass 1 has accepted the archive. On
/// failure during pass 2 the partially populated directory is left for the
/// caller to remove.
pub fn extract_archive(
    source: &Path,
    destination: &Path,
    limits: &ArchiveLimits,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, ArchiveError> {
    let inventory = inspect_archive(source, limits, cancel)?;

    let mut archive = open_archive(source)?;
    if archive.len() != inventory.entries.len() {
        return Err(ArchiveError::Corrupt(
            "archive changed between inspection and extraction".to_string(),
        ));
    }

    std::fs::create_dir_all(destination)?;
    let mut result = ExtractionResult::default();

    for entry in inventory.entries.iter().filter(|e| e.is_dir) {
        std::fs::create_dir_all(destination.join(&entry.path))?;
        result.directories += 1;
    }

    for entry in inventory.entries.iter().filter(|e| !e.is_dir) {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        let zip_file = archive.by_index(entry.index)?;
        if zip_file.name() != entry.name {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} changed between inspection and extraction",
                entry.name
            )));
        }

        let target = destination.join(&entry.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = BufWriter::new(File::create(&target)?);
        let written = std::io::copy(&mut zip_file.take(entry.size.saturating_add(1)), &mut out)?;
        out.flush()?;

        if written != entry.size {
            return Err(ArchiveError::SizeMismatch {
                entry: entry.name.clone(),
                declared: entry.size,
                actual: written,
            });
        }

        result.total_bytes = result.total_bytes.saturating_add(written);
        if result.total_bytes > limits.max_total_uncompressed {
            return Err(ArchiveError::QuotaExceeded {
                total: result.total_bytes,
                limit: limits.max_total_uncompressed,
            });
        }

        result.files.push(target);
    }

    info!(
        files = result.files.len(),
        directories = result.directories,
        bytes = result.total_bytes,
        "Archive extracted"
    );

    Ok(result)
}

/// Random access to individual entries of an archive that already passed
/// [`inspect_archive`].
pub struct EntryReader {
    archive: ZipArchive<BufReader<File>>,
}

impl EntryReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Ok(Self {
            archive: open_archive(path)?,
        })
    }

    /// Stream the entry `name` into `sink`, reading at most `max_bytes`.
    ///
    /// Returns `None` when the entry does not exist and `Some(bytes)`
    /// otherwise. An entry longer than `max_bytes` is
    /// [`ArchiveError::QuotaExceeded`].
    pub fn copy_to(
        &mut self,
        name: &str,
        sink: &mut dyn Write,
        max_bytes: u64,
    ) -> Result<Option<u64>, ArchiveError> {
        let entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let copied = std::io::copy(&mut entry.take(max_bytes.saturating_add(1)), sink)?;
        if copied > max_bytes {
            return Err(ArchiveError::QuotaExceeded {
                total: copied,
                limit: max_bytes,
            });
        }
        Ok(Some(copied))
    }

    /// Read the entry `name` into memory, bounded by `max_bytes`.
    pub fn read(&mut self, name: &str, max_bytes: u64) -> Result<Option<Vec<u8>>, ArchiveError> {
        let mut buffer = Vec::new();
        Ok(self
            .copy_to(name, &mut buffer, max_bytes)?
            .map(|_| buffer))
    }
}
