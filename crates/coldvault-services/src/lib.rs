//! Coldvault Services Layer
//!
//! Application services for the archive: single-shot uploads with content deduplication,
//! resumable chunked uploads, cold-storage retrieval and the expired-session janitor. Every
//! operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken) and returns
//! `Result<_, AppError>`; a duplicate upload is a successful outcome, not an error.

pub mod cancellation;
pub mod chunked;
pub mod cleanup;
pub mod outcome;
pub mod pipeline;
pub mod retrieval;
pub mod setup;
pub mod upload;

pub use cancellation::run_cancellable;
pub use chunked::{ChunkedUploadService, InitiateUpload};
pub use cleanup::{CleanupReport, SessionCleanupService};
pub use outcome::{
    ChunkUploadOutcome, DownloadOutcome, InitiateUploadOutcome, RetrievalOutcome, UploadOutcome,
};
pub use pipeline::ArchivePipeline;
pub use retrieval::RetrievalService;
pub use setup::{build_services, ArchiveServices};
pub use upload::{NewUpload, UploadService};
