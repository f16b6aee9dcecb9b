//! Domain events emitted by file record transitions.
//!
//! Transitions append events to the record; orchestrators drain them with
//! [`FileRecord::take_events`](super::FileRecord::take_events) and hand them to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::storage::StorageLocation;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FileEvent {
    Created {
        file_id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    },
    UploadStarted {
        file_id: Uuid,
        at: DateTime<Utc>,
    },
    UploadCompleted {
        file_id: Uuid,
        location: StorageLocation,
        at: DateTime<Utc>,
    },
    Archived {
        file_id: Uuid,
        at: DateTime<Utc>,
    },
    UploadFailed {
        file_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
    UploadReset {
        file_id: Uuid,
        at: DateTime<Utc>,
    },
    ThumbnailAttached {
        file_id: Uuid,
        location: StorageLocation,
        at: DateTime<Utc>,
    },
}

impl FileEvent {
    pub fn file_id(&self) -> Uuid {
        match self {
            FileEvent::Created { file_id, .. }
            | FileEvent::UploadStarted { file_id, .. }
            | FileEvent::UploadCompleted { file_id, .. }
            | FileEvent::Archived { file_id, .. }
            | FileEvent::UploadFailed { file_id, .. }
            | FileEvent::UploadReset { file_id, .. }
            | FileEvent::ThumbnailAttached { file_id, .. } => *file_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileEvent::Created { .. } => "file_created",
            FileEvent::UploadStarted { .. } => "upload_started",
            FileEvent::UploadCompleted { .. } => "upload_completed",
            FileEvent::Archived { .. } => "archived",
            FileEvent::UploadFailed { .. } => "upload_failed",
            FileEvent::UploadReset { .. } => "upload_reset",
            FileEvent::ThumbnailAttached { .. } => "thumbnail_attached",
        }
    }
}
