//! Expired upload session janitor
//!
//! Deletes sessions that expired before completion, together with their placeholder file
//! records. Records that already moved past `Pending` are left alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coldvault_core::models::{UploadSession, UploadState};
use coldvault_core::AppError;
use coldvault_db::{ChangeSet, RecordStore};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Sessions examined per run.
const DEFAULT_BATCH_SIZE: u32 = 500;

/// Shortest interval between runs; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions_deleted: usize,
    pub records_deleted: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct SessionCleanupService {
    store: Arc<dyn RecordStore>,
    interval: Duration,
    batch_size: u32,
}

impl SessionCleanupService {
    pub fn new(store: Arc<dyn RecordStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Start the background cleanup loop. It stops when `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut cleanup_interval = interval(self.interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Session cleanup stopped");
                        break;
                    }
                    _ = cleanup_interval.tick() => {}
                }

                tracing::info!("Starting scheduled cleanup of expired upload sessions");
                match self.run_once().await {
                    Ok(report) => tracing::info!(
                        sessions_deleted = report.sessions_deleted,
                        records_deleted = report.records_deleted,
                        failures = report.failures,
                        "Session cleanup completed"
                    ),
                    Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
                }
            }
        })
    }

    pub async fn run_once(&self) -> Result<CleanupReport, AppError> {
        self.run_once_at(Utc::now()).await
    }

    /// One cleanup pass treating `now` as the current time.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "expired_sessions"))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<CleanupReport, AppError> {
        let expired = self.store.expired_sessions(now, self.batch_size).await?;
        let mut report = CleanupReport::default();

        for session in expired {
            match self.remove(&session).await {
                Ok(record_deleted) => {
                    report.sessions_deleted += 1;
                    if record_deleted {
                        report.records_deleted += 1;
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        error = %e,
                        session_id = %session.id(),
                        "Failed to delete expired upload session"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Returns whether the placeholder record was deleted too.
    async fn remove(&self, session: &UploadSession) -> Result<bool, AppError> {
        let record = self.store.get_by_id(session.file_id()).await?;
        let delete_record = record.as_ref().is_some_and(|r| {
            r.state() == UploadState::Pending && r.has_placeholder_digest()
        });

        let mut changes = ChangeSet::new();
        if delete_record {
            changes = changes.delete_file(session.file_id());
        }
        self.store
            .save_changes(changes.delete_session(session.id()))
            .await?;

        tracing::info!(
            session_id = %session.id(),
            file_id = %session.file_id(),
            expires_at = %session.expires_at(),
            record_deleted = delete_record,
            "Deleted expired upload session"
        );
        Ok(delete_record)
    }
}
