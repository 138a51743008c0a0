//! Pre-restore validation.
//!
//! Runs entirely on a blocking thread: archive inspection (pass 1 only),
//! bounded metadata read, schema and manifest checks, and optional checksum
//! verification streamed straight from the archive.

use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{
    inspect_archive, resolve_in_namespace, ArchiveInventory, ArchiveLimits, EntryReader,
};
use crate::model::{
    AppBackup, BackupFormat, ChecksumWriter, CURRENT_BACKUP_VERSION, METADATA_FILE, PHOTOS_DIR,
};
use crate::utils::errors::{ArchiveError, BackupWarning, ImportError, ValidationIssue};

const ZIP_MAGIC: [&[u8; 4]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Outcome of validating a backup file.
///
/// `errors` block a restore; `warnings` are for the caller to judge.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Container format detected from the file content
    pub format: Option<BackupFormat>,

    /// Parsed metadata, when it could be read
    pub backup: Option<AppBackup>,

    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<BackupWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Counts for display before a restore is confirmed.
    pub fn preview(&self) -> Option<BackupPreview> {
        let backup = self.backup.as_ref()?;
        Some(BackupPreview {
            version: backup.version,
            export_date: backup.export_date,
            app_version: backup.app_version.clone(),
            categories: backup.categories.len(),
            photos: backup.photos.len(),
            had_pin: backup.settings.security_settings.has_pin,
        })
    }
}

/// Summary of a backup's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupPreview {
    pub version: u32,
    pub export_date: i64,
    pub app_version: String,
    pub categories: usize,
    pub photos: usize,
    pub had_pin: bool,
}

/// Validate the backup at `path`.
///
/// Only an unreadable file or cancellation is an `Err`; every finding about
/// the backup itself lands in the returned [`ValidationResult`].
pub fn validate_file(
    path: &Path,
    limits: &ArchiveLimits,
    validate_integrity: bool,
    cancel: &CancellationToken,
) -> Result<ValidationResult, ImportError> {
    let mut magic = [0u8; 4];
    let read = File::open(path)
        .and_then(|mut f| f.read(&mut magic))
        .map_err(|e| ImportError::io("failed to open backup", e))?;

    let result = if read == 4 && ZIP_MAGIC.iter().any(|m| **m == magic) {
        validate_zip(path, limits, validate_integrity, cancel)?
    } else {
        validate_json(path, limits)?
    };

    info!(
        format = ?result.format,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "Backup validated"
    );
    Ok(result)
}

fn validate_json(path: &Path, limits: &ArchiveLimits) -> Result<ValidationResult, ImportError> {
    let mut result = ValidationResult::default();

    let size = std::fs::metadata(path)
        .map_err(|e| ImportError::io("failed to stat backup", e))?
        .len();
    if size > limits.max_metadata_bytes {
        result.errors.push(ValidationIssue::NotABackup);
        return Ok(result);
    }

    let bytes = std::fs::read(path).map_err(|e| ImportError::io("failed to read backup", e))?;
    let looks_like_json = bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'{')
        .unwrap_or(false);
    if !looks_like_json {
        result.errors.push(ValidationIssue::NotABackup);
        return Ok(result);
    }

    result.format = Some(BackupFormat::Json);
    match serde_json::from_slice::<AppBackup>(&bytes) {
        Ok(backup) => check_document(backup, BackupFormat::Json, &mut result),
        Err(e) => result.errors.push(ValidationIssue::MetadataParse(e.to_string())),
    }
    Ok(result)
}

fn validate_zip(
    path: &Path,
    limits: &ArchiveLimits,
    validate_integrity: bool,
    cancel: &CancellationToken,
) -> Result<ValidationResult, ImportError> {
    let mut result = ValidationResult {
        format: Some(BackupFormat::Zip),
        ..ValidationResult::default()
    };

    let inventory = match inspect_archive(path, limits, cancel) {
        Ok(inventory) => inventory,
        Err(ArchiveError::Cancelled) => return Err(ImportError::Cancelled),
        Err(e) => {
            warn!("Backup archive rejected: {}", e);
            result.errors.push(ValidationIssue::Archive(e));
            return Ok(result);
        }
    };

    let Some(metadata_entry) = inventory.file(METADATA_FILE) else {
        result.errors.push(ValidationIssue::MissingMetadata);
        return Ok(result);
    };
    if metadata_entry.size > limits.max_metadata_bytes {
        result.errors.push(ValidationIssue::MetadataTooLarge {
            limit: limits.max_metadata_bytes,
        });
        return Ok(result);
    }
    let metadata_name = metadata_entry.name.clone();

    let mut reader = EntryReader::open(path).map_err(ImportError::Extraction)?;
    let bytes = match reader.read(&metadata_name, limits.max_metadata_bytes) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            result.errors.push(ValidationIssue::MissingMetadata);
            return Ok(result);
        }
        Err(ArchiveError::QuotaExceeded { .. }) => {
            result.errors.push(ValidationIssue::MetadataTooLarge {
                limit: limits.max_metadata_bytes,
            });
            return Ok(result);
        }
        Err(e) => {
            result.errors.push(ValidationIssue::Archive(e));
            return Ok(result);
        }
    };

    let backup = match serde_json::from_slice::<AppBackup>(&bytes) {
        Ok(backup) => backup,
        Err(e) => {
            result.errors.push(ValidationIssue::MetadataParse(e.to_string()));
            return Ok(result);
        }
    };

    check_document(backup, BackupFormat::Zip, &mut result);
    if !result.is_valid() {
        return Ok(result);
    }

    let Some(backup) = result.backup.as_ref() else {
        return Ok(result);
    };
    let (findings, failure) =
        check_archived_files(backup, &inventory, &mut reader, validate_integrity, cancel)?;

    for warning in findings {
        if !result.warnings.contains(&warning) {
            result.warnings.push(warning);
        }
    }
    if let Some(issue) = failure {
        result.errors.push(issue);
    }

    debug!(
        entries = inventory.entries.len(),
        files = inventory.file_count(),
        "Archive contents checked against manifest"
    );
    Ok(result)
}

/// Match manifest entries against archived files, hashing them when
/// `validate_integrity` is set.
fn check_archived_files(
    backup: &AppBackup,
    inventory: &ArchiveInventory,
    reader: &mut EntryReader,
    validate_integrity: bool,
    cancel: &CancellationToken,
) -> Result<(Vec<BackupWarning>, Option<ValidationIssue>), ImportError> {
    let mut findings = Vec::new();

    for entry in &backup.photo_manifest {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let Some(photo) = backup.photos.iter().find(|p| p.id == entry.photo_id) else {
            continue;
        };
        let Ok(resolved) = resolve_in_namespace(&entry.zip_entry_name, PHOTOS_DIR) else {
            continue;
        };

        let Some(archived) = inventory.file_at(&resolved) else {
            findings.push(BackupWarning::MissingPhotoFile {
                photo_id: entry.photo_id,
                path: photo.path.clone(),
            });
            continue;
        };

        if !validate_integrity || entry.checksum.is_none() {
            continue;
        }

        let (Some(checksum), Some(algorithm)) = (&entry.checksum, entry.checksum_algorithm()) else {
            if let Some(checksum) = &entry.checksum {
                findings.push(BackupWarning::UnverifiableChecksum {
                    photo_id: entry.photo_id,
                    checksum: checksum.clone(),
                });
            }
            continue;
        };
        debug!(photo_id = entry.photo_id, ?algorithm, checksum = %checksum, "Verifying photo");

        let mut sink = ChecksumWriter::with_algorithm(algorithm);
        match reader.copy_to(&archived.name, &mut sink, archived.size) {
            Ok(Some(_)) => {
                if let Some(warning) = entry.verify(&sink.finish()) {
                    warn!(photo_id = entry.photo_id, "{}", warning);
                    findings.push(warning);
                }
            }
            Ok(None) => {}
            Err(e) => return Ok((findings, Some(ValidationIssue::Archive(e)))),
        }
    }

    Ok((findings, None))
}

/// Schema and invariant checks shared by both containers.
fn check_document(mut backup: AppBackup, detected: BackupFormat, result: &mut ValidationResult) {
    if backup.format != detected {
        result.warnings.push(BackupWarning::FormatMismatch {
            declared: backup.format.to_string(),
            detected: detected.to_string(),
        });
        backup.format = detected;
    }

    if !backup.is_supported_version() {
        result.errors.push(ValidationIssue::UnsupportedVersion {
            found: backup.version,
            supported: CURRENT_BACKUP_VERSION,
        });
        result.backup = Some(backup);
        return;
    }

    let report = backup.check_invariants();
    result.errors.extend(report.errors);
    result.warnings.extend(report.warnings);
    result.backup = Some(backup);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options: FileOptions<'_, ()> = FileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn metadata(checksum: &str) -> String {
        format!(
            r#"{{
                "version": 2, "exportDate": 1, "appVersion": "1.0", "format": "ZIP",
                "categories": [{{"id": 1, "name": "family", "displayName": "Family"}}],
                "photos": [{{"id": 5, "path": "/p/cat.jpg", "categoryId": 1}}],
                "settings": {{"isDarkMode": true, "securitySettings": {{"hasPIN": true}}}},
                "photoManifest": [{{"photoId": 5, "zipEntryName": "photos/5_cat.jpg",
                                    "fileName": "cat.jpg", "fileSize": 5, "checksum": "{}"}}]
            }}"#,
            checksum
        )
    }

    fn validate(path: &Path, integrity: bool) -> ValidationResult {
        validate_file(path, &ArchiveLimits::default(), integrity, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_valid_zip_backup() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("ok.zip");
        let sum = crate::model::compute_checksum(b"hello");
        write_zip(
            &path,
            &[("metadata.json", metadata(&sum).as_bytes()), ("photos/5_cat.jpg", b"hello")],
        );

        let result = validate(&path, true);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.format, Some(BackupFormat::Zip));

        let preview = result.preview().unwrap();
        assert_eq!(preview.photos, 1);
        assert!(preview.had_pin);
        Ok(())
    }

    #[test]
    fn test_checksum_mismatch_is_a_warning() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("tampered.zip");
        let sum = crate::model::compute_checksum(b"hello");
        write_zip(
            &path,
            &[("metadata.json", metadata(&sum).as_bytes()), ("photos/5_cat.jpg", b"HELLO")],
        );

        let result = validate(&path, true);
        assert!(result.is_valid());
        assert!(matches!(
            result.warnings.as_slice(),
            [BackupWarning::ChecksumMismatch { photo_id: 5, .. }]
        ));

        // Without integrity checking the file is not hashed.
        assert!(validate(&path, false).warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_md5_manifest_checksums_are_verified() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let md5_of_hello = "5d41402abc4b2a76b9719d911017c592";

        let intact = temp_dir.path().join("intact.zip");
        write_zip(
            &intact,
            &[("metadata.json", metadata(md5_of_hello).as_bytes()), ("photos/5_cat.jpg", b"hello")],
        );
        let result = validate(&intact, true);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);

        let corrupted = temp_dir.path().join("corrupted.zip");
        write_zip(
            &corrupted,
            &[("metadata.json", metadata(md5_of_hello).as_bytes()), ("photos/5_cat.jpg", b"jello")],
        );
        let result = validate(&corrupted, true);
        assert!(matches!(
            result.warnings.as_slice(),
            [BackupWarning::ChecksumMismatch { photo_id: 5, .. }]
        ));
        Ok(())
    }

    #[test]
    fn test_missing_archived_file_is_a_warning() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nofile.zip");
        write_zip(&path, &[("metadata.json", metadata("abc").as_bytes())]);

        let result = validate(&path, true);
        assert!(result.is_valid());
        assert_eq!(
            result.warnings,
            vec![BackupWarning::MissingPhotoFile {
                photo_id: 5,
                path: "/p/cat.jpg".into()
            }]
        );
        Ok(())
    }

    #[test]
    fn test_missing_metadata_is_an_error() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nometa.zip");
        write_zip(&path, &[("photos/5_cat.jpg", b"hello")]);

        let result = validate(&path, false);
        assert!(matches!(result.errors.as_slice(), [ValidationIssue::MissingMetadata]));
        Ok(())
    }

    #[test]
    fn test_future_version_is_rejected() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("future.zip");
        let doc = metadata("abc").replace("\"version\": 2", "\"version\": 99");
        write_zip(&path, &[("metadata.json", doc.as_bytes())]);

        let result = validate(&path, false);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationIssue::UnsupportedVersion { found: 99, .. }]
        ));
        Ok(())
    }

    #[test]
    fn test_traversal_archive_is_an_error() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("evil.zip");
        write_zip(&path, &[("../../etc/passwd", b"root"), ("metadata.json", b"{}")]);

        let result = validate(&path, false);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationIssue::Archive(ArchiveError::PathTraversal { .. })]
        ));
        Ok(())
    }

    #[test]
    fn test_legacy_json_backup() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r#"  {"version": 1, "categories": [{"id": 1, "name": "a"}],
                  "photos": [{"id": 2, "path": "/x.jpg", "categoryId": 1}]}"#,
        )?;

        let result = validate(&path, true);
        assert!(result.is_valid());
        assert_eq!(result.format, Some(BackupFormat::Json));
        assert!(result.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_random_bytes_are_not_a_backup() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("noise.bin");
        std::fs::write(&path, [0xFFu8, 0xD8, 0xFF, 0xE0, 0x00])?;

        let result = validate(&path, false);
        assert!(matches!(result.errors.as_slice(), [ValidationIssue::NotABackup]));
        assert!(result.format.is_none());
        Ok(())
    }
}
