//! Results returned by the application services.

use chrono::{DateTime, Utc};
use coldvault_core::models::{FileEvent, RetrievalStatus, StorageLocation};
use coldvault_storage::ByteStream;
use uuid::Uuid;

/// Result of a single-shot upload or a chunked-upload completion.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub file_id: Uuid,
    pub location: Option<StorageLocation>,
    pub thumbnail: Option<StorageLocation>,
    /// The content was already archived; `file_id` is the existing record.
    pub is_duplicate: bool,
    /// Transitions recorded while handling the request, for forwarding to notifiers.
    pub events: Vec<FileEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiateUploadOutcome {
    pub session_id: Uuid,
    pub file_id: Uuid,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkUploadOutcome {
    pub chunk_index: u32,
    pub uploaded_chunks: u32,
    pub progress: f64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    /// `{provider}:{provider_retrieval_id}`, accepted by `check_retrieval_status`.
    pub retrieval_id: String,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub status: RetrievalStatus,
}

pub struct DownloadOutcome {
    pub stream: ByteStream,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

impl std::fmt::Debug for DownloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOutcome")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
