//! Chunked upload sessions
//!
//! A large upload is registered chunk by chunk and finalized in one step. Chunks can arrive
//! in any order and repeat; the session records which indices it has seen so a client can
//! resume after a crash. Completion is refused until every index is recorded, then hashes
//! the assembled content and archives it like a single-shot upload.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use coldvault_core::models::{
    ContentType, FileRecord, FileSize, UploadSession, UploadSessionStatus,
};
use coldvault_core::validation::require_non_empty;
use coldvault_core::{AppError, UploadConfig};
use coldvault_db::ChangeSet;
use coldvault_processing::compute_digest;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancellation::{ensure_active, run_cancellable};
use crate::outcome::{ChunkUploadOutcome, InitiateUploadOutcome, UploadOutcome};
use crate::pipeline::{rewind, ArchivePipeline};

#[derive(Debug, Clone)]
pub struct InitiateUpload {
    pub owner_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub total_size: u64,
    pub captured_at: DateTime<Utc>,
    /// Defaults to the configured chunk size (5 MiB).
    pub chunk_size: Option<u64>,
}

#[derive(Clone)]
pub struct ChunkedUploadService {
    pipeline: ArchivePipeline,
    config: UploadConfig,
}

impl ChunkedUploadService {
    pub fn new(pipeline: ArchivePipeline, config: UploadConfig) -> Self {
        Self { pipeline, config }
    }

    async fn load_session(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<UploadSession, AppError> {
        run_cancellable(cancel, self.pipeline.store().get_session(session_id))
            .await?
            .ok_or(AppError::SessionNotFound(session_id))
    }

    /// Open a session and create its file record with a placeholder digest.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(owner_id = %request.owner_id, total_size = request.total_size)
    )]
    pub async fn initiate_upload(
        &self,
        request: InitiateUpload,
        cancel: &CancellationToken,
    ) -> Result<InitiateUploadOutcome, AppError> {
        require_non_empty("file name", &request.file_name)?;
        if request.total_size == 0 {
            return Err(AppError::InvalidArgument(
                "total size must be greater than zero".to_string(),
            ));
        }
        let content_type = ContentType::new(&request.mime_type)?;
        let size = FileSize::from_bytes(request.total_size)?;
        let chunk_size = request.chunk_size.unwrap_or(self.config.chunk_size_bytes);

        let record = FileRecord::with_placeholder_digest(
            request.owner_id,
            &request.file_name,
            request.captured_at,
            size,
            content_type,
        )?;
        let ttl = Duration::try_hours(self.config.session_ttl_hours).ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "session lifetime of {} hours is out of range",
                self.config.session_ttl_hours
            ))
        })?;
        let session = UploadSession::new(
            record.id(),
            request.owner_id,
            request.total_size,
            chunk_size,
            ttl,
        )?;

        run_cancellable(
            cancel,
            self.pipeline
                .store()
                .save_changes(ChangeSet::new().add_file(&record).add_session(&session)),
        )
        .await?;

        tracing::info!(
            session_id = %session.id(),
            file_id = %record.id(),
            chunk_size,
            total_chunks = session.total_chunks(),
            "Upload session initiated"
        );

        Ok(InitiateUploadOutcome {
            session_id: session.id(),
            file_id: record.id(),
            chunk_size,
            total_chunks: session.total_chunks(),
            expires_at: session.expires_at(),
        })
    }

    /// Record one chunk. Repeating an index is harmless; an out-of-range index or a payload of
    /// the wrong length leaves the session untouched.
    #[tracing::instrument(skip(self, data, cancel), fields(chunk_size = data.len()))]
    pub async fn upload_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ChunkUploadOutcome, AppError> {
        let session = self.load_session(session_id, cancel).await?;
        if session.completed_at().is_none() && session.is_expired() {
            return Err(AppError::SessionExpired(session_id));
        }
        session.validate_chunk(chunk_index, data.len() as u64)?;

        let session = run_cancellable(
            cancel,
            self.pipeline.store().record_chunk(session_id, chunk_index),
        )
        .await?;

        tracing::debug!(
            session_id = %session_id,
            chunk_index,
            uploaded = session.uploaded_chunks().len(),
            total_chunks = session.total_chunks(),
            "Chunk recorded"
        );

        Ok(ChunkUploadOutcome {
            chunk_index,
            uploaded_chunks: session.uploaded_chunks().len() as u32,
            progress: session.progress(),
            is_complete: session.is_complete(),
        })
    }

    /// Finalize a session from the assembled content.
    ///
    /// `source` must hold exactly `total_size` bytes and be seekable. When the content turns
    /// out to be a duplicate, the placeholder record is removed and the existing file returned.
    #[tracing::instrument(skip(self, source, cancel))]
    pub async fn complete_upload<S>(
        &self,
        session_id: Uuid,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, AppError>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let started = Instant::now();
        let store = self.pipeline.store();

        let mut session = self.load_session(session_id, cancel).await?;
        if session.completed_at().is_none() && session.is_expired() {
            return Err(AppError::SessionExpired(session_id));
        }
        session.complete(Utc::now())?;

        let mut record = run_cancellable(cancel, store.get_by_id(session.file_id()))
            .await?
            .ok_or(AppError::FileNotFound(session.file_id()))?;

        let digest = run_cancellable(cancel, async {
            compute_digest(source).await.map_err(AppError::from)
        })
        .await?;
        if digest.size != session.total_size() {
            return Err(AppError::SizeMismatch {
                expected: session.total_size(),
                actual: digest.size,
            });
        }

        if let Some(existing) = run_cancellable(cancel, store.get_by_digest(&digest.hex)).await? {
            return self.finish_as_duplicate(&record, session, existing).await;
        }

        rewind(source).await?;
        record.resolve_digest(&digest.hex)?;
        let location = self.pipeline.archive(&mut record, source, None, cancel).await?;

        if let Err(e) = ensure_active(cancel) {
            self.pipeline.discard_record_objects(&record).await;
            return Err(e);
        }

        let changes = ChangeSet::new()
            .update_file(&record)
            .update_session(&session);
        match store.save_changes(changes).await {
            Ok(()) => {}
            Err(AppError::DuplicateDigest(digest)) => {
                self.pipeline.discard_record_objects(&record).await;
                let winner = store
                    .get_by_digest(&digest)
                    .await?
                    .ok_or_else(|| AppError::DuplicateDigest(digest.clone()))?;
                return self.finish_as_duplicate(&record, session, winner).await;
            }
            Err(e) => {
                self.pipeline.discard_record_objects(&record).await;
                return Err(e);
            }
        }

        tracing::info!(
            session_id = %session_id,
            file_id = %record.id(),
            provider = %location.provider,
            size_bytes = record.size().bytes(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Chunked upload completed"
        );

        Ok(UploadOutcome {
            file_id: record.id(),
            location: Some(location),
            thumbnail: record.thumbnail().cloned(),
            is_duplicate: false,
            events: record.take_events(),
        })
    }

    /// Drop the placeholder record and close the session against `existing`.
    async fn finish_as_duplicate(
        &self,
        placeholder: &FileRecord,
        mut session: UploadSession,
        existing: FileRecord,
    ) -> Result<UploadOutcome, AppError> {
        session.resolve_to(existing.id())?;
        self.pipeline
            .store()
            .save_changes(
                ChangeSet::new()
                    .delete_file(placeholder.id())
                    .update_session(&session),
            )
            .await?;

        tracing::info!(
            session_id = %session.id(),
            file_id = %existing.id(),
            "Duplicate content, returning existing file"
        );

        Ok(UploadOutcome {
            file_id: existing.id(),
            location: existing.location().cloned(),
            thumbnail: existing.thumbnail().cloned(),
            is_duplicate: true,
            events: Vec::new(),
        })
    }

    /// Snapshot of a session, or `None` if it does not exist.
    pub async fn get_session_status(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<UploadSessionStatus>, AppError> {
        let session = run_cancellable(cancel, self.pipeline.store().get_session(session_id)).await?;
        Ok(session.map(|s| s.status_at(Utc::now())))
    }
}
