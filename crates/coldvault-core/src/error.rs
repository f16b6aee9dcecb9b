//! Error types module
//!
//! All application-level failures are unified under [`AppError`]. Every variant belongs to
//! one [`ErrorCategory`], which tells callers whether retrying can help:
//!
//! - **Caller** errors fail fast and are never retried automatically.
//! - **State** errors mean an invariant would have been violated.
//! - **Transient** errors come from providers or the record store and may be retried.
//! - **Internal** errors are programming or configuration faults.
//!
//! The `Database` variant carries a `sqlx::Error` when the `sqlx` feature is enabled.

use std::io;

use uuid::Uuid;

use crate::models::UploadState;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors like validation failures
    Debug,
    /// Recoverable issues
    Warn,
    /// Unexpected failures
    Error,
}

/// Coarse classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Caller,
    State,
    Transient,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File size must be between 1 and {max} bytes, got {size}")]
    InvalidFileSize { size: i64, max: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Chunk index {index} is out of range (total chunks: {total_chunks})")]
    InvalidChunkIndex { index: u32, total_chunks: u32 },

    #[error("File not found: {0}")]
    FileNotFound(Uuid),

    #[error("File {0} has not been uploaded yet")]
    FileNotUploaded(Uuid),

    #[error("Upload session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Upload session {0} has expired")]
    SessionExpired(Uuid),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("No storage provider available: {0}")]
    NoProviderAvailable(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStateTransition { from: UploadState, to: UploadState },

    #[error("File {0} is archived and can no longer be modified")]
    RecordArchived(Uuid),

    #[error("{0} is already set and cannot be changed")]
    ImmutableField(&'static str),

    #[error("Upload incomplete: {uploaded} of {total} chunks uploaded")]
    UploadIncomplete { uploaded: u32, total: u32 },

    #[error("Upload session {0} is already completed")]
    SessionAlreadyCompleted(Uuid),

    #[error("Assembled upload is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("RetrievalId cannot be null")]
    RetrievalIdMissing,

    #[error("File must be retrieved from cold storage before download: {0}")]
    RetrievalRequired(String),

    #[error("A file with digest {0} already exists")]
    DuplicateDigest(String),

    #[error("Concurrent modification detected: {0}")]
    ConcurrencyConflict(String),

    /// Provider failure; the display form is the provider's message verbatim.
    #[error("{message}")]
    Provider { provider: String, message: String },

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, category, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (&'static str, ErrorCategory, bool, LogLevel) {
    use ErrorCategory::*;
    match err {
        AppError::InvalidArgument(_) => ("INVALID_ARGUMENT", Caller, false, LogLevel::Debug),
        AppError::InvalidFileSize { .. } => ("INVALID_FILE_SIZE", Caller, false, LogLevel::Debug),
        AppError::UnsupportedMediaType(_) => {
            ("UNSUPPORTED_MEDIA_TYPE", Caller, false, LogLevel::Debug)
        }
        AppError::InvalidChunkIndex { .. } => {
            ("INVALID_CHUNK_INDEX", Caller, false, LogLevel::Debug)
        }
        AppError::FileNotFound(_) => ("FILE_NOT_FOUND", Caller, false, LogLevel::Debug),
        AppError::FileNotUploaded(_) => ("FILE_NOT_UPLOADED", Caller, false, LogLevel::Debug),
        AppError::SessionNotFound(_) => ("SESSION_NOT_FOUND", Caller, false, LogLevel::Debug),
        AppError::SessionExpired(_) => ("SESSION_EXPIRED", Caller, false, LogLevel::Debug),
        AppError::UnsupportedOperation(_) => {
            ("UNSUPPORTED_OPERATION", Caller, false, LogLevel::Debug)
        }
        AppError::NoProviderAvailable(_) => {
            ("NO_PROVIDER_AVAILABLE", Internal, false, LogLevel::Error)
        }
        AppError::InvalidStateTransition { .. } => {
            ("INVALID_STATE_TRANSITION", State, false, LogLevel::Warn)
        }
        AppError::RecordArchived(_) => ("RECORD_ARCHIVED", State, false, LogLevel::Debug),
        AppError::ImmutableField(_) => ("IMMUTABLE_FIELD", State, false, LogLevel::Warn),
        AppError::UploadIncomplete { .. } => ("UPLOAD_INCOMPLETE", State, false, LogLevel::Debug),
        AppError::SessionAlreadyCompleted(_) => {
            ("SESSION_ALREADY_COMPLETED", State, false, LogLevel::Debug)
        }
        AppError::SizeMismatch { .. } => ("SIZE_MISMATCH", State, false, LogLevel::Debug),
        AppError::RetrievalIdMissing => ("RETRIEVAL_ID_MISSING", State, false, LogLevel::Error),
        AppError::RetrievalRequired(_) => ("RETRIEVAL_REQUIRED", State, false, LogLevel::Debug),
        AppError::DuplicateDigest(_) => ("DUPLICATE_DIGEST", State, false, LogLevel::Debug),
        AppError::ConcurrencyConflict(_) => {
            ("CONCURRENCY_CONFLICT", Transient, true, LogLevel::Warn)
        }
        AppError::Provider { .. } => ("PROVIDER_ERROR", Transient, true, LogLevel::Warn),
        AppError::Database(_) => ("DATABASE_ERROR", Transient, true, LogLevel::Error),
        AppError::Cancelled => ("CANCELLED", Caller, true, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            ("INTERNAL_ERROR", Internal, false, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Machine-readable error code (e.g. `UPLOAD_INCOMPLETE`)
    pub fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    pub fn category(&self) -> ErrorCategory {
        app_error_static_metadata(self).1
    }

    /// Whether the caller may retry the same operation
    pub fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    pub fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}
