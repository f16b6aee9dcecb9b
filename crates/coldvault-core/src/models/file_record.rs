use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content_type::ContentType;
use super::events::FileEvent;
use super::file_size::FileSize;
use super::storage::StorageLocation;
use super::upload_status::{UploadState, UploadStatus};
use crate::constants::PLACEHOLDER_DIGEST_PREFIX;
use crate::error::AppError;
use crate::validation::{require_non_empty, sanitize_filename, validate_description, validate_tags};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::InvalidArgument(format!(
                "GPS coordinates out of range: ({}, {})",
                latitude, longitude
            )));
        }
        Ok(GpsCoordinates {
            latitude,
            longitude,
        })
    }
}

/// Descriptive metadata embedded in a file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    original_name: String,
    sanitized_name: String,
    digest: String,
    captured_at: DateTime<Utc>,
    description: Option<String>,
    tags: Vec<String>,
    gps: Option<GpsCoordinates>,
}

impl FileMetadata {
    pub fn new(
        original_name: &str,
        digest: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        require_non_empty("file name", original_name)?;
        let digest = digest.into();
        require_non_empty("digest", &digest)?;
        Ok(FileMetadata {
            original_name: original_name.to_string(),
            sanitized_name: sanitize_filename(original_name),
            digest,
            captured_at,
            description: None,
            tags: Vec::new(),
            gps: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Result<Self, AppError> {
        let description = description.into();
        validate_description(&description)?;
        self.description = Some(description);
        Ok(self)
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Result<Self, AppError> {
        validate_tags(&tags)?;
        self.tags = tags;
        Ok(self)
    }

    pub fn with_gps(mut self, gps: GpsCoordinates) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn gps(&self) -> Option<GpsCoordinates> {
        self.gps
    }
}

/// Flat, persistence-facing view of a [`FileRecord`].
///
/// Repositories build records from parts when loading rows; nothing else should.
#[derive(Debug, Clone)]
pub struct FileRecordParts {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub metadata: FileMetadata,
    pub size: FileSize,
    pub content_type: ContentType,
    pub status: UploadStatus,
    pub location: Option<StorageLocation>,
    pub thumbnail: Option<StorageLocation>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Archived file aggregate root.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    id: Uuid,
    owner_id: Uuid,
    metadata: FileMetadata,
    size: FileSize,
    content_type: ContentType,
    status: UploadStatus,
    location: Option<StorageLocation>,
    thumbnail: Option<StorageLocation>,
    progress: u8,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    #[serde(skip)]
    events: Vec<FileEvent>,
}

impl FileRecord {
    /// Create a record in `Pending` state.
    pub fn new(
        owner_id: Uuid,
        metadata: FileMetadata,
        size: FileSize,
        content_type: ContentType,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), owner_id, metadata, size, content_type)
    }

    fn with_id(
        id: Uuid,
        owner_id: Uuid,
        metadata: FileMetadata,
        size: FileSize,
        content_type: ContentType,
    ) -> Self {
        let now = Utc::now();
        FileRecord {
            id,
            owner_id,
            metadata,
            size,
            content_type,
            status: UploadStatus::pending(now),
            location: None,
            thumbnail: None,
            progress: 0,
            created_at: now,
            updated_at: now,
            version: 0,
            events: vec![FileEvent::Created {
                file_id: id,
                owner_id,
                at: now,
            }],
        }
    }

    /// Create a record whose content digest is not known yet. The digest is
    /// `pending:{id}` until [`FileRecord::resolve_digest`] is called.
    pub fn with_placeholder_digest(
        owner_id: Uuid,
        original_name: &str,
        captured_at: DateTime<Utc>,
        size: FileSize,
        content_type: ContentType,
    ) -> Result<Self, AppError> {
        let id = Uuid::new_v4();
        let metadata = FileMetadata::new(
            original_name,
            format!("{}{}", PLACEHOLDER_DIGEST_PREFIX, id),
            captured_at,
        )?;
        Ok(Self::with_id(id, owner_id, metadata, size, content_type))
    }

    pub fn from_parts(parts: FileRecordParts) -> Self {
        FileRecord {
            id: parts.id,
            owner_id: parts.owner_id,
            metadata: parts.metadata,
            size: parts.size,
            content_type: parts.content_type,
            status: parts.status,
            location: parts.location,
            thumbnail: parts.thumbnail,
            progress: parts.progress,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
            events: Vec::new(),
        }
    }

    pub fn to_parts(&self) -> FileRecordParts {
        FileRecordParts {
            id: self.id,
            owner_id: self.owner_id,
            metadata: self.metadata.clone(),
            size: self.size,
            content_type: self.content_type.clone(),
            status: self.status,
            location: self.location.clone(),
            thumbnail: self.thumbnail.clone(),
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn digest(&self) -> &str {
        self.metadata.digest()
    }

    pub fn size(&self) -> FileSize {
        self.size
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn state(&self) -> UploadState {
        self.status.state()
    }

    pub fn location(&self) -> Option<&StorageLocation> {
        self.location.as_ref()
    }

    pub fn thumbnail(&self) -> Option<&StorageLocation> {
        self.thumbnail.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn is_archived(&self) -> bool {
        self.state() == UploadState::Archived
    }

    pub fn has_placeholder_digest(&self) -> bool {
        self.metadata.digest.starts_with(PLACEHOLDER_DIGEST_PREFIX)
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<FileEvent> {
        std::mem::take(&mut self.events)
    }

    fn transition(&mut self, next: UploadState) -> Result<DateTime<Utc>, AppError> {
        let now = Utc::now();
        self.status = self.status.transition(next, now)?;
        self.updated_at = now;
        Ok(now)
    }

    pub fn start_upload(&mut self) -> Result<(), AppError> {
        let at = self.transition(UploadState::Uploading)?;
        self.events.push(FileEvent::UploadStarted {
            file_id: self.id,
            at,
        });
        Ok(())
    }

    /// Move to `Completed` and record where the bytes landed. The location can only be set once.
    pub fn complete_upload(&mut self, location: StorageLocation) -> Result<(), AppError> {
        if !self.state().can_transition_to(UploadState::Completed) {
            return Err(AppError::InvalidStateTransition {
                from: self.state(),
                to: UploadState::Completed,
            });
        }
        if self.location.is_some() {
            return Err(AppError::ImmutableField("storage location"));
        }
        let at = self.transition(UploadState::Completed)?;
        self.location = Some(location.clone());
        self.progress = 100;
        self.events.push(FileEvent::UploadCompleted {
            file_id: self.id,
            location,
            at,
        });
        Ok(())
    }

    pub fn archive(&mut self) -> Result<(), AppError> {
        let at = self.transition(UploadState::Archived)?;
        self.events.push(FileEvent::Archived {
            file_id: self.id,
            at,
        });
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        let at = self.transition(UploadState::Failed)?;
        self.events.push(FileEvent::UploadFailed {
            file_id: self.id,
            reason: reason.into(),
            at,
        });
        Ok(())
    }

    /// Return a failed upload to `Pending` so it can be attempted again.
    pub fn retry(&mut self) -> Result<(), AppError> {
        let at = self.transition(UploadState::Pending)?;
        self.progress = 0;
        self.events.push(FileEvent::UploadReset {
            file_id: self.id,
            at,
        });
        Ok(())
    }

    /// Thumbnails are independent of the main status and may be attached after archiving.
    pub fn attach_thumbnail(&mut self, location: StorageLocation) -> Result<(), AppError> {
        if self.thumbnail.is_some() {
            return Err(AppError::ImmutableField("thumbnail location"));
        }
        let at = Utc::now();
        self.thumbnail = Some(location.clone());
        self.updated_at = at;
        self.events.push(FileEvent::ThumbnailAttached {
            file_id: self.id,
            location,
            at,
        });
        Ok(())
    }

    /// Advance upload progress. Values above 100 are rejected; lower values than the
    /// current progress are ignored.
    pub fn set_progress(&mut self, progress: u8) -> Result<(), AppError> {
        if progress > 100 {
            return Err(AppError::InvalidArgument(format!(
                "Progress must be between 0 and 100, got {}",
                progress
            )));
        }
        if progress > self.progress {
            self.progress = progress;
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), AppError> {
        if self.is_archived() {
            return Err(AppError::RecordArchived(self.id));
        }
        Ok(())
    }

    pub fn update_description(&mut self, description: Option<String>) -> Result<(), AppError> {
        self.ensure_mutable()?;
        if let Some(description) = &description {
            validate_description(description)?;
        }
        self.metadata.description = description;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_tags(&mut self, tags: Vec<String>) -> Result<(), AppError> {
        self.ensure_mutable()?;
        validate_tags(&tags)?;
        self.metadata.tags = tags;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the placeholder digest with the real content digest. Only allowed once, and
    /// only while the record still carries a placeholder.
    pub fn resolve_digest(&mut self, digest: impl Into<String>) -> Result<(), AppError> {
        self.ensure_mutable()?;
        if !self.has_placeholder_digest() {
            return Err(AppError::ImmutableField("content digest"));
        }
        let digest = digest.into();
        require_non_empty("digest", &digest)?;
        if digest.starts_with(PLACEHOLDER_DIGEST_PREFIX) {
            return Err(AppError::InvalidArgument(
                "digest cannot be a placeholder".to_string(),
            ));
        }
        self.metadata.digest = digest;
        self.updated_at = Utc::now();
        Ok(())
    }
}
