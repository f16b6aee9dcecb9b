//! Chunked upload session aggregate.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Derived lifecycle of a session at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initiated,
    Accumulating,
    Complete,
    Expired,
}

/// Persistence-facing view of an [`UploadSession`].
#[derive(Debug, Clone)]
pub struct UploadSessionParts {
    pub id: Uuid,
    pub file_id: Uuid,
    pub owner_id: Uuid,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub uploaded_chunks: BTreeSet<u32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Tracks a large upload split into fixed-size chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSession {
    id: Uuid,
    file_id: Uuid,
    owner_id: Uuid,
    total_size: u64,
    chunk_size: u64,
    total_chunks: u32,
    uploaded_chunks: BTreeSet<u32>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
}

/// Snapshot returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSessionStatus {
    pub session_id: Uuid,
    pub file_id: Uuid,
    pub state: SessionState,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub uploaded_chunks: Vec<u32>,
    pub missing_chunks: Vec<u32>,
    pub progress: f64,
    pub is_complete: bool,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn new(
        file_id: Uuid,
        owner_id: Uuid,
        total_size: u64,
        chunk_size: u64,
        ttl: Duration,
    ) -> Result<Self, AppError> {
        if total_size == 0 {
            return Err(AppError::InvalidArgument(
                "total size must be greater than zero".to_string(),
            ));
        }
        if chunk_size == 0 {
            return Err(AppError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        let total_chunks = u32::try_from(total_size.div_ceil(chunk_size)).map_err(|_| {
            AppError::InvalidArgument(format!(
                "chunk size {} is too small for {} bytes",
                chunk_size, total_size
            ))
        })?;

        let created_at = Utc::now();
        let expires_at = created_at.checked_add_signed(ttl).ok_or_else(|| {
            AppError::InvalidArgument(format!("session lifetime {} is out of range", ttl))
        })?;
        Ok(UploadSession {
            id: Uuid::new_v4(),
            file_id,
            owner_id,
            total_size,
            chunk_size,
            total_chunks,
            uploaded_chunks: BTreeSet::new(),
            created_at,
            expires_at,
            completed_at: None,
            version: 0,
        })
    }

    pub fn from_parts(parts: UploadSessionParts) -> Self {
        UploadSession {
            id: parts.id,
            file_id: parts.file_id,
            owner_id: parts.owner_id,
            total_size: parts.total_size,
            chunk_size: parts.chunk_size,
            total_chunks: parts.total_chunks,
            uploaded_chunks: parts.uploaded_chunks,
            created_at: parts.created_at,
            expires_at: parts.expires_at,
            completed_at: parts.completed_at,
            version: parts.version,
        }
    }

    pub fn to_parts(&self) -> UploadSessionParts {
        UploadSessionParts {
            id: self.id,
            file_id: self.file_id,
            owner_id: self.owner_id,
            total_size: self.total_size,
            chunk_size: self.chunk_size,
            total_chunks: self.total_chunks,
            uploaded_chunks: self.uploaded_chunks.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
            version: self.version,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_id(&self) -> Uuid {
        self.file_id
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn uploaded_chunks(&self) -> &BTreeSet<u32> {
        &self.uploaded_chunks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Percentage of chunks received, `0.0..=100.0`.
    pub fn progress(&self) -> f64 {
        self.uploaded_chunks.len() as f64 / self.total_chunks as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks.len() as u32 == self.total_chunks
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.uploaded_chunks.contains(i))
            .collect()
    }

    /// Byte length chunk `index` must have. Every chunk is `chunk_size` except the last.
    pub fn expected_chunk_len(&self, index: u32) -> Result<u64, AppError> {
        self.check_index(index)?;
        if index + 1 < self.total_chunks {
            Ok(self.chunk_size)
        } else {
            Ok(self.total_size - u64::from(self.total_chunks - 1) * self.chunk_size)
        }
    }

    fn check_index(&self, index: u32) -> Result<(), AppError> {
        if index >= self.total_chunks {
            return Err(AppError::InvalidChunkIndex {
                index,
                total_chunks: self.total_chunks,
            });
        }
        Ok(())
    }

    /// Validate a chunk without touching the session.
    pub fn validate_chunk(&self, index: u32, len: u64) -> Result<(), AppError> {
        if self.completed_at.is_some() {
            return Err(AppError::SessionAlreadyCompleted(self.id));
        }
        let expected = self.expected_chunk_len(index)?;
        if len != expected {
            return Err(AppError::InvalidArgument(format!(
                "chunk {} must be {} bytes, got {}",
                index, expected, len
            )));
        }
        Ok(())
    }

    /// Mark a chunk as received. Returns `false` when it was already marked.
    pub fn mark_chunk(&mut self, index: u32) -> Result<bool, AppError> {
        if self.completed_at.is_some() {
            return Err(AppError::SessionAlreadyCompleted(self.id));
        }
        self.check_index(index)?;
        Ok(self.uploaded_chunks.insert(index))
    }

    /// Finalize the session. Refused unless every chunk has been marked.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), AppError> {
        if self.completed_at.is_some() {
            return Err(AppError::SessionAlreadyCompleted(self.id));
        }
        if !self.is_complete() {
            return Err(AppError::UploadIncomplete {
                uploaded: self.uploaded_chunks.len() as u32,
                total: self.total_chunks,
            });
        }
        self.completed_at = Some(at);
        Ok(())
    }

    /// Point a completed session at the record that already held its content.
    pub fn resolve_to(&mut self, file_id: Uuid) -> Result<(), AppError> {
        if self.completed_at.is_none() {
            return Err(AppError::InvalidArgument(format!(
                "upload session {} is not completed",
                self.id
            )));
        }
        self.file_id = file_id;
        Ok(())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.completed_at.is_some() {
            SessionState::Complete
        } else if self.is_expired_at(now) {
            SessionState::Expired
        } else if self.uploaded_chunks.is_empty() {
            SessionState::Initiated
        } else {
            SessionState::Accumulating
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> UploadSessionStatus {
        UploadSessionStatus {
            session_id: self.id,
            file_id: self.file_id,
            state: self.state_at(now),
            total_size: self.total_size,
            chunk_size: self.chunk_size,
            total_chunks: self.total_chunks,
            uploaded_chunks: self.uploaded_chunks.iter().copied().collect(),
            missing_chunks: self.missing_chunks(),
            progress: self.progress(),
            is_complete: self.is_complete(),
            is_expired: self.is_expired_at(now),
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
        }
    }
}
