//! Entry point for callers: one backup or restore at a time.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::export::{ExportEngine, ExportOptions, ExportOutcome, ExportStage};
use crate::import::{ImportEngine, ImportOptions, ImportSummary, RestorePhase, ValidationResult};
use crate::progress::ProgressCallback;
use crate::repository::Repositories;
use crate::utils::errors::{ExportError, ImportError};

pub struct BackupService {
    config: Arc<Config>,
    export: ExportEngine,
    import: ImportEngine,
    /// Single permit shared by exports and restores
    operations: Arc<Semaphore>,
}

impl BackupService {
    pub fn new(config: Config, repos: Repositories) -> Self {
        let config = Arc::new(config);
        Self {
            export: ExportEngine::new(repos.clone(), config.clone()),
            import: ImportEngine::new(repos, config.clone()),
            config,
            operations: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether an export or restore currently holds the service.
    pub fn is_busy(&self) -> bool {
        self.operations.available_permits() == 0
    }

    fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = self.operations.clone().try_acquire_owned().ok();
        if permit.is_none() {
            warn!("Rejected operation: another backup or restore is running");
        }
        permit
    }

    /// Export the current app state. Fails with [`ExportError::Busy`] while
    /// another operation runs.
    pub async fn create_backup(
        &self,
        options: ExportOptions,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<ExportStage>>,
    ) -> Result<ExportOutcome, ExportError> {
        let _permit = self.acquire().ok_or(ExportError::Busy)?;
        self.export.create_backup(options, cancel, on_progress).await
    }

    /// Validate without importing. Read-only, so it does not take the
    /// operation permit.
    pub async fn validate_backup(
        &self,
        path: &Path,
        validate_integrity: bool,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, ImportError> {
        self.import.validate_backup(path, validate_integrity, cancel).await
    }

    /// Restore a backup. Fails with [`ImportError::Busy`] while another
    /// operation runs.
    pub async fn restore_from_backup(
        &self,
        path: &Path,
        options: ImportOptions,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<RestorePhase>>,
    ) -> Result<ImportSummary, ImportError> {
        let _permit = self.acquire().ok_or(ImportError::Busy)?;
        self.import
            .restore_from_backup(path, options, cancel, on_progress)
            .await
    }
}
