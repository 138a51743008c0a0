//! Error and warning types for backup, export and restore.
//!
//! Fatal conditions are `thiserror` enums per layer. Soft conditions that a
//! restore or export survives are [`BackupWarning`]s returned alongside the
//! result instead of being raised.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::import::{ImportSummary, RestorePhase};

/// Archive codec errors. Every variant is fatal for the archive at hand.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive has too many entries: {count} (limit {limit})")]
    TooManyEntries { count: usize, limit: usize },

    #[error("archive entry escapes the destination directory: {entry}")]
    PathTraversal { entry: String },

    #[error("archive exceeds the uncompressed size quota: {total} bytes (limit {limit})")]
    QuotaExceeded { total: u64, limit: u64 },

    #[error("archive entry {entry} looks like a compression bomb ({ratio}:1, limit {limit}:1)")]
    CompressionBomb { entry: String, ratio: u64, limit: u64 },

    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error("archive entry {entry} declared {declared} bytes but produced {actual}")]
    SizeMismatch {
        entry: String,
        declared: u64,
        actual: u64,
    },

    #[error("unsupported archive entry {entry}: {reason}")]
    UnsupportedEntry { entry: String, reason: String },

    #[error("failed to write archive: {0}")]
    Write(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive operation cancelled")]
    Cancelled,
}

impl ArchiveError {
    /// True for the security/integrity rejections raised while validating.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            ArchiveError::TooManyEntries { .. }
                | ArchiveError::PathTraversal { .. }
                | ArchiveError::QuotaExceeded { .. }
                | ArchiveError::CompressionBomb { .. }
                | ArchiveError::UnsupportedEntry { .. }
        )
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ArchiveError::Io(e),
            other => ArchiveError::Corrupt(other.to_string()),
        }
    }
}

/// Export errors. Per-photo problems are warnings, not this type.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize backup metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to build archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to read app data: {0:#}")]
    Repository(anyhow::Error),

    #[error("export cancelled")]
    Cancelled,

    #[error("another backup or restore is already running")]
    Busy,
}

impl ExportError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// A blocking finding produced by backup validation.
#[derive(Error, Debug)]
pub enum ValidationIssue {
    #[error("file is neither a ZIP archive nor a JSON backup")]
    NotABackup,

    #[error("archive rejected: {0}")]
    Archive(ArchiveError),

    #[error("backup does not contain metadata.json")]
    MissingMetadata,

    #[error("metadata.json is larger than {limit} bytes")]
    MetadataTooLarge { limit: u64 },

    #[error("metadata could not be parsed: {0}")]
    MetadataParse(String),

    #[error("unsupported backup version {found} (supported 1..={supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("photo {photo_id} has {count} manifest entries")]
    DuplicateManifestEntry { photo_id: i64, count: usize },

    #[error("manifest entry {entry} is outside the photos/ namespace")]
    ManifestEntryOutsideNamespace { entry: String },

    #[error("warning treated as error: {0}")]
    Warning(BackupWarning),
}

/// Rollback errors. A failed rollback may leave the store inconsistent.
#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("failed to capture rollback snapshot: {0:#}")]
    Snapshot(anyhow::Error),

    #[error("rollback incomplete, {} step(s) failed: {}", failures.len(), failures.join("; "))]
    Incomplete { failures: Vec<String> },
}

/// Restore errors.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("backup validation failed: {}", describe_issues(issues))]
    ValidationFailed { issues: Vec<ValidationIssue> },

    #[error("failed to extract backup: {0}")]
    Extraction(#[from] ArchiveError),

    #[error("failed to parse backup metadata: {0}")]
    MetadataParse(String),

    #[error("store operation failed while {phase}: {error:#}")]
    Repository {
        phase: RestorePhase,
        error: anyhow::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("restore cancelled")]
    Cancelled,

    #[error("another backup or restore is already running")]
    Busy,

    #[error("restore interrupted ({}): {cause}", if *rolled_back { "previous data restored" } else { "partially applied" })]
    Interrupted {
        cause: Box<ImportError>,
        partial: Box<ImportSummary>,
        rolled_back: bool,
    },

    #[error("restore failed ({cause}) and rollback failed, data may be inconsistent: {rollback}")]
    RollbackFailed {
        cause: Box<ImportError>,
        rollback: RollbackError,
    },
}

impl ImportError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn repository(phase: RestorePhase, error: anyhow::Error) -> Self {
        Self::Repository { phase, error }
    }

    /// The error that started the failure, looking through rollback wrappers.
    pub fn root_cause(&self) -> &ImportError {
        match self {
            ImportError::Interrupted { cause, .. } | ImportError::RollbackFailed { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }

    /// True when the store may be left inconsistent.
    pub fn is_data_at_risk(&self) -> bool {
        matches!(self, ImportError::RollbackFailed { .. })
    }
}

fn describe_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Non-fatal conditions reported with a successful export or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackupWarning {
    /// The photo file is absent; the record is exported/imported without it.
    MissingPhotoFile { photo_id: i64, path: String },
    /// An item already existed and was left untouched.
    DuplicateSkipped { item: String, identity: String },
    /// A photo referenced a category that is not in the backup.
    OrphanedCategory {
        photo_id: i64,
        category_id: i64,
        assigned_to: Option<i64>,
    },
    /// The archived file does not hash to the manifest checksum.
    ChecksumMismatch {
        photo_id: i64,
        expected: String,
        actual: String,
    },
    /// The manifest checksum is not in a format this engine can verify.
    UnverifiableChecksum { photo_id: i64, checksum: String },
    /// Two backup categories share a name; later ones fold into the first.
    DuplicateCategoryName { name: String },
    /// The manifest lists a photo the backup does not contain.
    UnknownManifestEntry { photo_id: i64 },
    /// The document's declared format disagrees with its container.
    FormatMismatch { declared: String, detected: String },
}

impl fmt::Display for BackupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupWarning::MissingPhotoFile { photo_id, .. } => {
                write!(f, "photo {} has no file in the backup", photo_id)
            }
            BackupWarning::DuplicateSkipped { item, identity } => {
                write!(f, "{} '{}' already exists, skipped", item, identity)
            }
            BackupWarning::OrphanedCategory {
                photo_id,
                category_id,
                assigned_to,
            } => match assigned_to {
                Some(target) => write!(
                    f,
                    "photo {} referenced missing category {}, moved to category {}",
                    photo_id, category_id, target
                ),
                None => write!(
                    f,
                    "photo {} referenced missing category {}",
                    photo_id, category_id
                ),
            },
            BackupWarning::ChecksumMismatch { photo_id, .. } => {
                write!(f, "photo {} failed checksum verification", photo_id)
            }
            BackupWarning::UnverifiableChecksum { photo_id, .. } => {
                write!(f, "photo {} has a checksum that cannot be verified", photo_id)
            }
            BackupWarning::DuplicateCategoryName { name } => {
                write!(f, "category name '{}' appears more than once", name)
            }
            BackupWarning::UnknownManifestEntry { photo_id } => {
                write!(f, "manifest lists unknown photo {}", photo_id)
            }
            BackupWarning::FormatMismatch { declared, detected } => {
                write!(f, "backup declares format {} but is {}", declared, detected)
            }
        }
    }
}
