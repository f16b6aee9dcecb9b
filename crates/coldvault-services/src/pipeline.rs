//! Archive pipeline shared by the upload services
//!
//! Moves a record from `Pending` to `Archived` by writing its bytes to the selected provider,
//! then attaches a best-effort thumbnail. Nothing here touches the record store; callers
//! persist the record once the pipeline succeeds.

use std::io::{Cursor, SeekFrom};
use std::sync::Arc;

use coldvault_core::constants::THUMBNAIL_CATEGORY;
use coldvault_core::models::{FileRecord, StorageLocation};
use coldvault_core::{AppError, ThumbnailConfig};
use coldvault_db::RecordStore;
use coldvault_processing::{Thumbnailer, THUMBNAIL_CONTENT_TYPE};
use coldvault_storage::{ProviderSelector, StorageProvider, UploadRequest};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::cancellation::run_cancellable;

/// Rewind a source before another full pass over it.
pub(crate) async fn rewind<S>(source: &mut S) -> Result<(), AppError>
where
    S: AsyncSeek + Unpin + ?Sized,
{
    source.seek(SeekFrom::Start(0)).await.map_err(|e| {
        AppError::InvalidArgument(format!("source stream could not be rewound: {}", e))
    })?;
    Ok(())
}

#[derive(Clone)]
pub struct ArchivePipeline {
    store: Arc<dyn RecordStore>,
    selector: Arc<ProviderSelector>,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
    thumbnail_config: ThumbnailConfig,
}

impl ArchivePipeline {
    pub fn new(store: Arc<dyn RecordStore>, selector: Arc<ProviderSelector>) -> Self {
        ArchivePipeline {
            store,
            selector,
            thumbnailer: None,
            thumbnail_config: ThumbnailConfig {
                enabled: false,
                ..ThumbnailConfig::default()
            },
        }
    }

    pub fn with_thumbnails(
        mut self,
        thumbnailer: Arc<dyn Thumbnailer>,
        config: ThumbnailConfig,
    ) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self.thumbnail_config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn selector(&self) -> &Arc<ProviderSelector> {
        &self.selector
    }

    /// Upload the source to the selected provider and archive `record`.
    ///
    /// `record` must be `Pending` and `source` positioned at the start. On provider failure the
    /// record is marked failed in memory and the error is returned.
    pub(crate) async fn archive<S>(
        &self,
        record: &mut FileRecord,
        source: &mut S,
        preference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StorageLocation, AppError>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        record.start_upload()?;

        let content_type = record.content_type().clone();
        let provider =
            self.selector
                .select(content_type.category(), record.size().bytes(), preference)?;

        let request = UploadRequest {
            category: content_type.category().as_str().to_string(),
            file_name: record.metadata().sanitized_name().to_string(),
            content_type: content_type.mime_type().to_string(),
            content_length: Some(record.size().bytes()),
        };

        let upload = async {
            provider
                .upload(&request, source)
                .await
                .map_err(|e| e.into_app_error(provider.name()))
        };
        let location = match run_cancellable(cancel, upload).await {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    file_id = %record.id(),
                    provider = %provider.name(),
                    "Upload to storage provider failed"
                );
                record.fail(e.to_string())?;
                return Err(e);
            }
        };

        record.complete_upload(location.clone())?;
        record.archive()?;

        tracing::info!(
            file_id = %record.id(),
            provider = %provider.name(),
            key = %location.path,
            size_bytes = record.size().bytes(),
            "File archived"
        );

        self.attach_thumbnail(record, source, cancel).await;
        Ok(location)
    }

    /// Generate and store a preview. Any failure is logged and swallowed.
    async fn attach_thumbnail<S>(
        &self,
        record: &mut FileRecord,
        source: &mut S,
        cancel: &CancellationToken,
    ) where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let Some(thumbnailer) = &self.thumbnailer else {
            return;
        };
        if !self.thumbnail_config.enabled
            || !thumbnailer.is_supported(record.content_type().mime_type())
        {
            return;
        }

        match self.store_thumbnail(thumbnailer.as_ref(), record, source, cancel).await {
            Ok(location) => {
                if let Err(e) = record.attach_thumbnail(location.clone()) {
                    tracing::warn!(error = %e, file_id = %record.id(), "Could not attach thumbnail");
                    self.discard(&location).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    file_id = %record.id(),
                    "Thumbnail generation failed, continuing without thumbnail"
                );
            }
        }
    }

    async fn store_thumbnail<S>(
        &self,
        thumbnailer: &dyn Thumbnailer,
        record: &FileRecord,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<StorageLocation, AppError>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        rewind(source).await?;
        let config = &self.thumbnail_config;
        let preview = run_cancellable(cancel, async {
            thumbnailer
                .generate(source, config.width, config.height, config.quality)
                .await
                .map_err(AppError::from)
        })
        .await?;

        let provider = self.selector.instant_access_provider()?;
        let request = UploadRequest {
            category: THUMBNAIL_CATEGORY.to_string(),
            file_name: format!("{}.jpg", record.id()),
            content_type: THUMBNAIL_CONTENT_TYPE.to_string(),
            content_length: Some(preview.len() as u64),
        };
        let mut reader = Cursor::new(preview);
        let location = run_cancellable(cancel, async {
            provider
                .upload(&request, &mut reader)
                .await
                .map_err(|e| e.into_app_error(provider.name()))
        })
        .await?;

        tracing::debug!(
            file_id = %record.id(),
            provider = %provider.name(),
            key = %location.path,
            "Thumbnail stored"
        );
        Ok(location)
    }

    /// Best-effort removal of an object this request wrote but will not keep.
    pub(crate) async fn discard(&self, location: &StorageLocation) {
        let provider: Arc<dyn StorageProvider> = match self.selector.registry().resolve(location) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!(error = %e, location = %location, "Cannot resolve provider for orphaned object");
                return;
            }
        };
        match provider.delete(location).await {
            Ok(_) => tracing::debug!(location = %location, "Removed orphaned object"),
            Err(e) => {
                tracing::warn!(error = %e, location = %location, "Failed to remove orphaned object")
            }
        }
    }

    /// Remove the main object and thumbnail of a record that will not be persisted.
    pub(crate) async fn discard_record_objects(&self, record: &FileRecord) {
        if let Some(location) = record.location() {
            self.discard(location).await;
        }
        if let Some(thumbnail) = record.thumbnail() {
            self.discard(thumbnail).await;
        }
    }
}
