//! Storage capability provider trait
//!
//! This module defines the [`StorageProvider`] trait that every backing store implements,
//! along with the error type shared by all providers.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use coldvault_core::models::{
    RetrievalResult, RetrievalStatusDetail, RetrievalTier, StorageLocation,
};
use coldvault_core::AppError;
use futures::Stream;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::capabilities::ProviderCapabilities;
use crate::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Object must be restored before it can be read: {0}")]
    RetrievalRequired(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("No storage provider available: {0}")]
    NoProviderAvailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streamed object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

impl StorageError {
    /// Convert into an [`AppError`], attributing transient failures to `provider`. Provider
    /// failures keep the provider's own message without the variant prefix.
    pub fn into_app_error(self, provider: &str) -> AppError {
        match self {
            StorageError::UnsupportedOperation(msg) => AppError::UnsupportedOperation(msg),
            StorageError::RetrievalRequired(key) => AppError::RetrievalRequired(format!(
                "{} on {}: initiate a retrieval and wait until it is ready",
                key, provider
            )),
            StorageError::NoProviderAvailable(msg) => AppError::NoProviderAvailable(msg),
            StorageError::InvalidKey(msg) => AppError::InvalidArgument(msg),
            StorageError::ConfigError(msg) => AppError::Internal(msg),
            StorageError::UploadFailed(msg)
            | StorageError::DownloadFailed(msg)
            | StorageError::DeleteFailed(msg)
            | StorageError::NotFound(msg)
            | StorageError::Unavailable(msg)
            | StorageError::BackendError(msg)
            | StorageError::RetrievalFailed(msg) => AppError::provider(provider, msg),
            StorageError::IoError(e) => AppError::provider(provider, e.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        err.into_app_error("storage")
    }
}

/// What is being written. Providers derive the object key from these fields.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Key prefix, e.g. `photo`, `video` or `thumbnails`.
    pub category: String,
    pub file_name: String,
    pub content_type: String,
    /// Exact byte count when known. Lets providers choose single-shot vs multipart writes.
    pub content_length: Option<u64>,
}

/// Result of a connectivity probe. Probes never fail; an unhealthy result carries the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub response_time: Duration,
    pub message: String,
}

impl HealthStatus {
    pub fn healthy(response_time: Duration) -> Self {
        HealthStatus {
            is_healthy: true,
            response_time,
            message: "ok".to_string(),
        }
    }

    pub fn unhealthy(response_time: Duration, message: impl Into<String>) -> Self {
        HealthStatus {
            is_healthy: false,
            response_time,
            message: message.into(),
        }
    }
}

/// Storage capability provider
///
/// One implementation per backing store. The provider name is stored in every
/// [`StorageLocation`] it returns and is how the registry finds the provider again.
///
/// Ordinary failures are returned as [`StorageError`]; implementations must not panic.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Registry name, also written into [`StorageLocation::provider`].
    fn name(&self) -> &str;

    fn backend_type(&self) -> StorageBackend;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// Write the reader to EOF under a freshly generated key, using the provider's native
    /// storage class.
    async fn upload(
        &self,
        request: &UploadRequest,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<StorageLocation>;

    /// Stream an object. Fails with [`StorageError::NotFound`] when the key is absent and with
    /// [`StorageError::RetrievalRequired`] when an archived object has not been restored.
    async fn download(&self, location: &StorageLocation) -> StorageResult<ByteStream>;

    /// Returns `false` when the object was already absent.
    async fn delete(&self, location: &StorageLocation) -> StorageResult<bool>;

    /// Start restoring an archived object. Only meaningful when
    /// `capabilities().supports_retrieval` is set.
    async fn initiate_retrieval(
        &self,
        _location: &StorageLocation,
        _tier: RetrievalTier,
    ) -> StorageResult<RetrievalResult> {
        Err(StorageError::UnsupportedOperation(format!(
            "provider '{}' serves objects instantly and does not support retrieval",
            self.name()
        )))
    }

    async fn retrieval_status(&self, _retrieval_id: &str) -> StorageResult<RetrievalStatusDetail> {
        Err(StorageError::UnsupportedOperation(format!(
            "provider '{}' does not track retrievals",
            self.name()
        )))
    }

    /// Cheap, side-effect-free connectivity probe.
    async fn check_health(&self) -> HealthStatus;
}
