//! In-process storage provider for development and tests.
//!
//! An archival `MemoryStorage` behaves like a cold tier: objects cannot be downloaded until a
//! retrieval has been initiated and its restore delay has elapsed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use coldvault_core::models::{
    RetrievalResult, RetrievalStatus, RetrievalStatusDetail, RetrievalTier, StorageLocation,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::capabilities::ProviderCapabilities;
use crate::keys::{generate_storage_key, validate_key};
use crate::traits::{
    ByteStream, HealthStatus, StorageError, StorageProvider, StorageResult, UploadRequest,
};
use crate::StorageBackend;

/// Size of the chunks yielded by downloads.
const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

struct StoredObject {
    data: Bytes,
    content_type: String,
    restore_ready_at: Option<Instant>,
}

struct MemoryRetrieval {
    key: String,
    requested_at: Instant,
    ready_at: Instant,
    ready_at_utc: DateTime<Utc>,
}

pub struct MemoryStorage {
    name: String,
    capabilities: ProviderCapabilities,
    restore_delay: Duration,
    objects: RwLock<HashMap<String, StoredObject>>,
    retrievals: RwLock<HashMap<String, MemoryRetrieval>>,
    healthy: AtomicBool,
    uploads: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>, capabilities: ProviderCapabilities) -> Self {
        MemoryStorage {
            name: name.into(),
            capabilities,
            restore_delay: Duration::ZERO,
            objects: RwLock::new(HashMap::new()),
            retrievals: RwLock::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            uploads: AtomicUsize::new(0),
        }
    }

    /// Instant-access provider.
    pub fn instant(name: impl Into<String>) -> Self {
        Self::new(name, ProviderCapabilities::instant())
    }

    /// Archival provider whose restores complete after `restore_delay`.
    pub fn archival(name: impl Into<String>, restore_delay: Duration) -> Self {
        let mut storage = Self::new(
            name,
            ProviderCapabilities::archival(restore_delay, restore_delay),
        );
        storage.restore_delay = restore_delay;
        storage
    }

    /// Toggle the result of [`StorageProvider::check_health`].
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of successful uploads since creation.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn contains(&self, location: &StorageLocation) -> bool {
        self.objects.read().await.contains_key(&location.path)
    }

    /// Content type recorded for an object.
    pub async fn content_type_of(&self, location: &StorageLocation) -> Option<String> {
        self.objects
            .read()
            .await
            .get(&location.path)
            .map(|o| o.content_type.clone())
    }

    fn requires_restore(&self) -> bool {
        !self.capabilities.supports_instant_access
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<StorageLocation> {
        let mut data = Vec::with_capacity(request.content_length.unwrap_or(0) as usize);
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to read from stream: {}", e)))?;

        let key = generate_storage_key(&request.category, &request.file_name, Utc::now());
        let size = data.len();
        self.objects.write().await.insert(
            key.clone(),
            StoredObject {
                data: Bytes::from(data),
                content_type: request.content_type.clone(),
                restore_ready_at: None,
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(provider = %self.name, key = %key, size_bytes = size, "Memory storage upload");
        Ok(StorageLocation::new(&self.name, key))
    }

    async fn download(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        validate_key(&location.path)?;
        let objects = self.objects.read().await;
        let object = objects
            .get(&location.path)
            .ok_or_else(|| StorageError::NotFound(location.path.clone()))?;

        if self.requires_restore() {
            let restored = object
                .restore_ready_at
                .is_some_and(|ready_at| Instant::now() >= ready_at);
            if !restored {
                return Err(StorageError::RetrievalRequired(location.path.clone()));
            }
        }

        let chunks: Vec<Result<Bytes, StorageError>> = object
            .data
            .chunks(DOWNLOAD_CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn delete(&self, location: &StorageLocation) -> StorageResult<bool> {
        validate_key(&location.path)?;
        Ok(self.objects.write().await.remove(&location.path).is_some())
    }

    async fn initiate_retrieval(
        &self,
        location: &StorageLocation,
        tier: RetrievalTier,
    ) -> StorageResult<RetrievalResult> {
        if !self.capabilities.supports_retrieval {
            return Err(StorageError::UnsupportedOperation(format!(
                "provider '{}' serves objects instantly and does not support retrieval",
                self.name
            )));
        }

        let now = Instant::now();
        let ready_at = now + self.restore_delay;
        let ready_at_utc = Utc::now()
            + chrono::Duration::from_std(self.restore_delay).unwrap_or(chrono::Duration::zero());

        {
            let mut objects = self.objects.write().await;
            let object = objects
                .get_mut(&location.path)
                .ok_or_else(|| StorageError::NotFound(location.path.clone()))?;
            object.restore_ready_at = Some(ready_at);
        }

        let retrieval_id = format!("mem-{}", Uuid::new_v4().simple());
        self.retrievals.write().await.insert(
            retrieval_id.clone(),
            MemoryRetrieval {
                key: location.path.clone(),
                requested_at: now,
                ready_at,
                ready_at_utc,
            },
        );

        tracing::debug!(
            provider = %self.name,
            key = %location.path,
            tier = %tier,
            retrieval_id = %retrieval_id,
            "Memory storage retrieval initiated"
        );

        Ok(RetrievalResult {
            retrieval_id: Some(retrieval_id),
            estimated_completion_at: Some(ready_at_utc),
            status: if self.restore_delay.is_zero() {
                RetrievalStatus::Ready
            } else {
                RetrievalStatus::Requested
            },
        })
    }

    async fn retrieval_status(&self, retrieval_id: &str) -> StorageResult<RetrievalStatusDetail> {
        let retrievals = self.retrievals.read().await;
        let retrieval = retrievals
            .get(retrieval_id)
            .ok_or_else(|| StorageError::NotFound(format!("retrieval {}", retrieval_id)))?;

        if !self.objects.read().await.contains_key(&retrieval.key) {
            return Ok(RetrievalStatusDetail {
                status: RetrievalStatus::Failed,
                progress_percentage: 0,
                completed_at: None,
            });
        }

        let now = Instant::now();
        if now >= retrieval.ready_at {
            return Ok(RetrievalStatusDetail {
                status: RetrievalStatus::Ready,
                progress_percentage: 100,
                completed_at: Some(retrieval.ready_at_utc),
            });
        }

        let elapsed = now.duration_since(retrieval.requested_at).as_secs_f64();
        let total = retrieval.ready_at.duration_since(retrieval.requested_at).as_secs_f64();
        let progress = ((elapsed / total) * 100.0).min(99.0) as u8;
        Ok(RetrievalStatusDetail {
            status: RetrievalStatus::InProgress,
            progress_percentage: progress,
            completed_at: None,
        })
    }

    async fn check_health(&self) -> HealthStatus {
        let start = Instant::now();
        if self.healthy.load(Ordering::SeqCst) {
            HealthStatus::healthy(start.elapsed())
        } else {
            HealthStatus::unhealthy(start.elapsed(), format!("{} is marked unhealthy", self.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request() -> UploadRequest {
        UploadRequest {
            category: "photo".to_string(),
            file_name: "a.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            content_length: Some(5),
        }
    }

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_instant_round_trip() {
        let storage = MemoryStorage::instant("memory");
        let mut reader = std::io::Cursor::new(b"hello".to_vec());
        let location = storage.upload(&request(), &mut reader).await.unwrap();

        assert_eq!(collect(storage.download(&location).await.unwrap()).await, b"hello");
        assert_eq!(storage.upload_count(), 1);
        assert!(storage.delete(&location).await.unwrap());
        assert!(!storage.delete(&location).await.unwrap());
    }

    #[tokio::test]
    async fn test_archival_download_requires_restore() {
        let storage = MemoryStorage::archival("cold", Duration::ZERO);
        let mut reader = std::io::Cursor::new(b"hello".to_vec());
        let location = storage.upload(&request(), &mut reader).await.unwrap();

        assert!(matches!(
            storage.download(&location).await,
            Err(StorageError::RetrievalRequired(_))
        ));

        let result = storage
            .initiate_retrieval(&location, RetrievalTier::Bulk)
            .await
            .unwrap();
        let id = result.retrieval_id.unwrap();
        let status = storage.retrieval_status(&id).await.unwrap();
        assert_eq!(status.status, RetrievalStatus::Ready);
        assert_eq!(status.progress_percentage, 100);

        assert_eq!(collect(storage.download(&location).await.unwrap()).await, b"hello");
    }

    #[tokio::test]
    async fn test_pending_restore_reports_progress() {
        let storage = MemoryStorage::archival("cold", Duration::from_secs(3600));
        let mut reader = std::io::Cursor::new(b"hello".to_vec());
        let location = storage.upload(&request(), &mut reader).await.unwrap();

        let result = storage
            .initiate_retrieval(&location, RetrievalTier::Standard)
            .await
            .unwrap();
        assert_eq!(result.status, RetrievalStatus::Requested);

        let status = storage
            .retrieval_status(result.retrieval_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(status.status, RetrievalStatus::InProgress);
        assert!(status.progress_percentage < 100);
        assert!(storage.download(&location).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_object_cannot_be_restored() {
        let storage = MemoryStorage::archival("cold", Duration::ZERO);
        let result = storage
            .initiate_retrieval(&StorageLocation::new("cold", "photo/missing.jpg"), RetrievalTier::Bulk)
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_health_toggle() {
        let storage = MemoryStorage::instant("memory");
        assert!(storage.check_health().await.is_healthy);
        storage.set_healthy(false);
        assert!(!storage.check_health().await.is_healthy);
    }
}
