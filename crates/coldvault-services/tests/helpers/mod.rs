//! Shared fixtures for the service integration tests: an in-memory record store, memory
//! providers named after the S3 storage classes, and a scripted provider for failure cases.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coldvault_core::models::{
    RetrievalResult, RetrievalStatus, RetrievalStatusDetail, RetrievalTier, StorageLocation,
};
use coldvault_core::{SelectionConfig, StorageBackend, ThumbnailConfig, UploadConfig};
use coldvault_db::{InMemoryRecordStore, RecordStore};
use coldvault_processing::ImageThumbnailer;
use coldvault_services::{
    ArchivePipeline, ChunkedUploadService, NewUpload, RetrievalService, SessionCleanupService,
    UploadService,
};
use coldvault_storage::{
    ByteStream, HealthStatus, MemoryStorage, ProviderCapabilities, ProviderRegistry,
    ProviderSelector, SelectionPolicy, StorageError, StorageProvider, StorageResult,
    UploadRequest,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

pub const SCRIPTED: &str = "scripted";

/// Provider whose behaviour is switched by flags and which counts every call.
pub struct ScriptedStorage {
    capabilities: ProviderCapabilities,
    pub fail_uploads: AtomicBool,
    pub omit_retrieval_id: AtomicBool,
    pub uploads: AtomicUsize,
    pub retrievals: AtomicUsize,
}

impl ScriptedStorage {
    pub fn new(capabilities: ProviderCapabilities) -> Self {
        ScriptedStorage {
            capabilities,
            fail_uploads: AtomicBool::new(false),
            omit_retrieval_id: AtomicBool::new(false),
            uploads: AtomicUsize::new(0),
            retrievals: AtomicUsize::new(0),
        }
    }

    pub fn retrieval_calls(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageProvider for ScriptedStorage {
    fn name(&self) -> &str {
        SCRIPTED
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
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("bucket unreachable".to_string()));
        }
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await?;
        Ok(StorageLocation::new(
            SCRIPTED,
            format!("{}/{}", request.category, request.file_name),
        ))
    }

    async fn download(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        Err(StorageError::NotFound(location.path.clone()))
    }

    async fn delete(&self, _location: &StorageLocation) -> StorageResult<bool> {
        Ok(false)
    }

    async fn initiate_retrieval(
        &self,
        _location: &StorageLocation,
        _tier: RetrievalTier,
    ) -> StorageResult<RetrievalResult> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        let retrieval_id = if self.omit_retrieval_id.load(Ordering::SeqCst) {
            None
        } else {
            Some("job-1".to_string())
        };
        Ok(RetrievalResult {
            retrieval_id,
            estimated_completion_at: Some(Utc::now()),
            status: RetrievalStatus::Requested,
        })
    }

    async fn retrieval_status(&self, retrieval_id: &str) -> StorageResult<RetrievalStatusDetail> {
        Err(StorageError::BackendError(format!(
            "restore job {} vanished",
            retrieval_id
        )))
    }

    async fn check_health(&self) -> HealthStatus {
        HealthStatus::healthy(Duration::ZERO)
    }
}

pub struct TestArchive {
    pub store: Arc<InMemoryRecordStore>,
    pub registry: Arc<ProviderRegistry>,
    pub deep_archive: Arc<MemoryStorage>,
    pub glacier: Arc<MemoryStorage>,
    pub standard: Arc<MemoryStorage>,
    pub local: Arc<MemoryStorage>,
    pub scripted: Arc<ScriptedStorage>,
    pub pipeline: ArchivePipeline,
    pub uploads: UploadService,
    pub chunked: ChunkedUploadService,
    pub retrievals: RetrievalService,
    pub cleanup: SessionCleanupService,
}

pub fn setup_archive() -> TestArchive {
    setup_archive_with(ProviderCapabilities::archival(
        Duration::from_secs(60),
        Duration::from_secs(3600),
    ))
}

/// Build an archive whose scripted provider has `scripted_capabilities`.
pub fn setup_archive_with(scripted_capabilities: ProviderCapabilities) -> TestArchive {
    let selection = SelectionConfig::default();

    let deep_archive = Arc::new(MemoryStorage::archival("s3-deep-archive", Duration::ZERO));
    let glacier = Arc::new(MemoryStorage::archival("s3-glacier", Duration::from_secs(3600)));
    let standard = Arc::new(MemoryStorage::instant("s3-standard"));
    let local = Arc::new(MemoryStorage::instant("local"));
    let scripted = Arc::new(ScriptedStorage::new(scripted_capabilities));

    let mut registry = ProviderRegistry::new();
    let providers: Vec<Arc<dyn StorageProvider>> = vec![
        local.clone(),
        standard.clone(),
        glacier.clone(),
        deep_archive.clone(),
        scripted.clone(),
    ];
    for provider in providers {
        let cost = selection
            .provider_costs
            .get(provider.name())
            .copied()
            .unwrap_or(1.0);
        registry.register(provider, cost).unwrap();
    }
    let registry = Arc::new(registry);

    let selector = Arc::new(ProviderSelector::new(
        registry.clone(),
        SelectionPolicy::from(&selection),
    ));
    let store = Arc::new(InMemoryRecordStore::new());
    let dyn_store: Arc<dyn RecordStore> = store.clone();

    let pipeline = ArchivePipeline::new(dyn_store.clone(), selector)
        .with_thumbnails(Arc::new(ImageThumbnailer::new()), ThumbnailConfig::default());

    TestArchive {
        uploads: UploadService::new(pipeline.clone()),
        chunked: ChunkedUploadService::new(pipeline.clone(), UploadConfig::default()),
        retrievals: RetrievalService::new(dyn_store.clone(), registry.clone()),
        cleanup: SessionCleanupService::new(dyn_store, Duration::from_secs(3600)),
        pipeline,
        store,
        registry,
        deep_archive,
        glacier,
        standard,
        local,
        scripted,
    }
}

pub fn photo_upload(owner_id: Uuid, file_name: &str) -> NewUpload {
    NewUpload::new(owner_id, file_name, "image/jpeg", Utc::now())
}

/// Bytes with a JPEG signature that no decoder will accept.
pub fn fake_jpeg(len: usize, seed: u8) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend((0..len.saturating_sub(4)).map(|i| (i as u8).wrapping_mul(31) ^ seed));
    data.truncate(len);
    data
}

/// A real PNG that the thumbnailer can decode.
pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub async fn collect(stream: ByteStream) -> Vec<u8> {
    use futures::StreamExt;

    let chunks: Vec<_> = stream.collect().await;
    chunks
        .into_iter()
        .flat_map(|chunk| chunk.unwrap().to_vec())
        .collect()
}
