//! Row types for the PostgreSQL store and their conversion into domain aggregates.

use chrono::{DateTime, Utc};
use coldvault_core::models::{
    ContentType, FileMetadata, FileRecord, FileRecordParts, FileSize, GpsCoordinates,
    StorageLocation, UploadSession, UploadSessionParts, UploadState, UploadStatus,
};
use coldvault_core::AppError;
use uuid::Uuid;

pub(crate) const FILE_COLUMNS: &str = "id, owner_id, original_name, digest, captured_at, \
     description, tags, gps_latitude, gps_longitude, size_bytes, content_type, upload_state, \
     status_changed_at, storage_provider, storage_path, thumbnail_provider, thumbnail_path, \
     progress, created_at, updated_at, version";

pub(crate) const SESSION_COLUMNS: &str = "id, file_id, owner_id, total_size, chunk_size, \
     total_chunks, uploaded_chunks, created_at, expires_at, completed_at, version";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FileRecordRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_name: String,
    pub digest: String,
    pub captured_at: DateTime<Utc>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub size_bytes: i64,
    pub content_type: String,
    pub upload_state: String,
    pub status_changed_at: DateTime<Utc>,
    pub storage_provider: Option<String>,
    pub storage_path: Option<String>,
    pub thumbnail_provider: Option<String>,
    pub thumbnail_path: Option<String>,
    pub progress: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

fn location(provider: Option<String>, path: Option<String>) -> Option<StorageLocation> {
    match (provider, path) {
        (Some(provider), Some(path)) => Some(StorageLocation::new(provider, path)),
        _ => None,
    }
}

fn corrupt(what: &str, id: Uuid, detail: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Stored {} {} is invalid: {}", what, id, detail))
}

impl TryFrom<FileRecordRow> for FileRecord {
    type Error = AppError;

    fn try_from(row: FileRecordRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let mut metadata = FileMetadata::new(&row.original_name, row.digest, row.captured_at)?
            .with_tags(row.tags)?;
        if let Some(description) = row.description {
            metadata = metadata.with_description(description)?;
        }
        if let (Some(latitude), Some(longitude)) = (row.gps_latitude, row.gps_longitude) {
            metadata = metadata.with_gps(GpsCoordinates::new(latitude, longitude)?);
        }

        let state: UploadState = row.upload_state.parse()?;
        let progress = u8::try_from(row.progress).map_err(|e| corrupt("file record", id, e))?;

        Ok(FileRecord::from_parts(FileRecordParts {
            id,
            owner_id: row.owner_id,
            metadata,
            size: FileSize::new(row.size_bytes)?,
            content_type: ContentType::new(&row.content_type)?,
            status: UploadStatus::restore(state, row.status_changed_at),
            location: location(row.storage_provider, row.storage_path),
            thumbnail: location(row.thumbnail_provider, row.thumbnail_path),
            progress,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UploadSessionRow {
    pub id: Uuid,
    pub file_id: Uuid,
    pub owner_id: Uuid,
    pub total_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub uploaded_chunks: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl TryFrom<UploadSessionRow> for UploadSession {
    type Error = AppError;

    fn try_from(row: UploadSessionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let uploaded_chunks = row
            .uploaded_chunks
            .into_iter()
            .map(u32::try_from)
            .collect::<Result<_, _>>()
            .map_err(|e| corrupt("upload session", id, e))?;

        Ok(UploadSession::from_parts(UploadSessionParts {
            id,
            file_id: row.file_id,
            owner_id: row.owner_id,
            total_size: u64::try_from(row.total_size).map_err(|e| corrupt("upload session", id, e))?,
            chunk_size: u64::try_from(row.chunk_size).map_err(|e| corrupt("upload session", id, e))?,
            total_chunks: u32::try_from(row.total_chunks)
                .map_err(|e| corrupt("upload session", id, e))?,
            uploaded_chunks,
            created_at: row.created_at,
            expires_at: row.expires_at,
            completed_at: row.completed_at,
            version: row.version,
        }))
    }
}

/// Non-negative `u64` as a BIGINT.
pub(crate) fn to_bigint(value: u64) -> Result<i64, AppError> {
    i64::try_from(value)
        .map_err(|_| AppError::InvalidArgument(format!("{} does not fit in BIGINT", value)))
}
