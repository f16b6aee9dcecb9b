//! Domain models
//!
//! The [`FileRecord`] aggregate owns its metadata, upload status and storage location as
//! embedded value objects. [`UploadSession`] is a separate aggregate that references a file
//! record by id.

mod content_type;
mod events;
mod file_record;
mod file_size;
mod retrieval;
mod storage;
mod upload_session;
mod upload_status;

pub use content_type::{ContentCategory, ContentType};
pub use events::FileEvent;
pub use file_record::{FileMetadata, FileRecord, FileRecordParts, GpsCoordinates};
pub use file_size::FileSize;
pub use retrieval::{RetrievalResult, RetrievalStatus, RetrievalStatusDetail, RetrievalTier};
pub use storage::StorageLocation;
pub use upload_session::{SessionState, UploadSession, UploadSessionParts, UploadSessionStatus};
pub use upload_status::{UploadState, UploadStatus};
