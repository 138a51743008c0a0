//! SmilePile Backup Library
//!
//! Transactional, integrity-checked ZIP backups of photo piles: export of
//! categories, photos, settings and a photo manifest, bounded two-pass
//! archive extraction, and REPLACE/MERGE/SKIP restore with rollback.

pub mod archive;
pub mod config;
pub mod export;
pub mod fs;
pub mod import;
pub mod model;
pub mod progress;
pub mod repository;
pub mod rollback;
pub mod service;
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveLimits, ExtractionResult};
pub use config::Config;
pub use export::{ExportEngine, ExportOptions, ExportOutcome};
pub use import::{ImportEngine, ImportOptions, ImportStrategy, ImportSummary, ValidationResult};
pub use model::{AppBackup, BackupCategory, BackupPhoto, BackupSettings, PhotoManifestEntry};
pub use repository::Repositories;
pub use service::BackupService;
pub use utils::errors::{ArchiveError, BackupWarning, ExportError, ImportError, RollbackError};
