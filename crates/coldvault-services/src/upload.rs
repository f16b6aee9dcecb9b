//! Single-shot upload orchestration
//!
//! Hash, deduplicate, select a provider, upload, thumbnail, persist. A record is only ever
//! persisted in `Archived` state: a failed or cancelled upload leaves nothing behind in the
//! record store.

use std::time::Instant;

use chrono::{DateTime, Utc};
use coldvault_core::models::{ContentType, FileMetadata, FileRecord, FileSize};
use coldvault_core::validation::require_non_empty;
use coldvault_core::AppError;
use coldvault_db::ChangeSet;
use coldvault_processing::compute_digest;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancellation::{ensure_active, run_cancellable};
use crate::outcome::UploadOutcome;
use crate::pipeline::{rewind, ArchivePipeline};

/// Caller-supplied description of a new file.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub owner_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Provider to use instead of the category default, if it is enabled.
    pub preferred_provider: Option<String>,
}

impl NewUpload {
    pub fn new(
        owner_id: Uuid,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        NewUpload {
            owner_id,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            captured_at,
            description: None,
            tags: Vec::new(),
            preferred_provider: None,
        }
    }
}

fn duplicate_outcome(existing: &FileRecord) -> UploadOutcome {
    UploadOutcome {
        file_id: existing.id(),
        location: existing.location().cloned(),
        thumbnail: existing.thumbnail().cloned(),
        is_duplicate: true,
        events: Vec::new(),
    }
}

#[derive(Clone)]
pub struct UploadService {
    pipeline: ArchivePipeline,
}

impl UploadService {
    pub fn new(pipeline: ArchivePipeline) -> Self {
        Self { pipeline }
    }

    /// Archive the content of `source`.
    ///
    /// The source is read up to three times (hash, upload, thumbnail) and must be seekable;
    /// callers holding a one-shot stream must buffer it first.
    #[tracing::instrument(
        skip(self, request, source, cancel),
        fields(owner_id = %request.owner_id, file_name = %request.file_name, mime_type = %request.mime_type)
    )]
    pub async fn upload<S>(
        &self,
        request: NewUpload,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, AppError>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let started = Instant::now();
        require_non_empty("file name", &request.file_name)?;
        require_non_empty("mime type", &request.mime_type)?;
        let content_type = ContentType::new(&request.mime_type)?;

        let digest = run_cancellable(cancel, async {
            compute_digest(source).await.map_err(AppError::from)
        })
        .await?;

        let store = self.pipeline.store();
        if let Some(existing) = run_cancellable(cancel, store.get_by_digest(&digest.hex)).await? {
            tracing::info!(
                file_id = %existing.id(),
                digest = %digest.hex,
                "Duplicate content, returning existing file"
            );
            return Ok(duplicate_outcome(&existing));
        }

        rewind(source).await?;

        let size = FileSize::from_bytes(digest.size)?;
        let mut metadata = FileMetadata::new(&request.file_name, &digest.hex, request.captured_at)?
            .with_tags(request.tags)?;
        if let Some(description) = request.description {
            metadata = metadata.with_description(description)?;
        }
        let mut record = FileRecord::new(request.owner_id, metadata, size, content_type);

        let location = self
            .pipeline
            .archive(
                &mut record,
                source,
                request.preferred_provider.as_deref(),
                cancel,
            )
            .await?;

        if let Err(e) = ensure_active(cancel) {
            self.pipeline.discard_record_objects(&record).await;
            return Err(e);
        }

        match store.save_changes(ChangeSet::new().add_file(&record)).await {
            Ok(()) => {}
            Err(AppError::DuplicateDigest(digest)) => {
                // Another request archived the same content first
                self.pipeline.discard_record_objects(&record).await;
                let winner = store
                    .get_by_digest(&digest)
                    .await?
                    .ok_or_else(|| AppError::DuplicateDigest(digest.clone()))?;
                tracing::info!(
                    file_id = %winner.id(),
                    digest = %digest,
                    "Lost deduplication race, returning existing file"
                );
                return Ok(duplicate_outcome(&winner));
            }
            Err(e) => {
                self.pipeline.discard_record_objects(&record).await;
                return Err(e);
            }
        }

        tracing::info!(
            file_id = %record.id(),
            provider = %location.provider,
            size_bytes = record.size().bytes(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Upload completed"
        );

        Ok(UploadOutcome {
            file_id: record.id(),
            location: Some(location),
            thumbnail: record.thumbnail().cloned(),
            is_duplicate: false,
            events: record.take_events(),
        })
    }
}
