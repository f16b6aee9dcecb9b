//! Service wiring from configuration

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use coldvault_core::ArchiveConfig;
use coldvault_db::{InMemoryRecordStore, PgRecordStore, RecordStore};
use coldvault_storage::{build_registry, ProviderRegistry, ProviderSelector, SelectionPolicy};

use crate::{
    ArchivePipeline, ChunkedUploadService, RetrievalService, SessionCleanupService, UploadService,
};

/// Every application service, sharing one record store and provider registry.
#[derive(Clone)]
pub struct ArchiveServices {
    pub uploads: Arc<UploadService>,
    pub chunked_uploads: Arc<ChunkedUploadService>,
    pub retrievals: Arc<RetrievalService>,
    pub session_cleanup: Arc<SessionCleanupService>,
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<dyn RecordStore>,
}

async fn create_store(config: &ArchiveConfig) -> Result<Arc<dyn RecordStore>> {
    if config.database.url.is_none() {
        tracing::warn!("DATABASE_URL not set, using in-memory record store; records are lost on restart");
        return Ok(Arc::new(InMemoryRecordStore::new()));
    }

    let pool = coldvault_db::connect(&config.database).await?;
    coldvault_db::run_migrations(&pool).await?;
    Ok(Arc::new(PgRecordStore::new(pool)))
}

/// Build the services from a validated configuration.
pub async fn build_services(config: &ArchiveConfig) -> Result<ArchiveServices> {
    config.validate()?;

    let registry = Arc::new(
        build_registry(config)
            .await
            .context("Failed to initialize storage providers")?,
    );
    let selector = Arc::new(ProviderSelector::new(
        Arc::clone(&registry),
        SelectionPolicy::from(&config.selection),
    ));
    let store = create_store(config).await?;

    let pipeline = ArchivePipeline::new(Arc::clone(&store), selector);
    #[cfg(feature = "image")]
    let pipeline = if config.thumbnail.enabled {
        pipeline.with_thumbnails(
            Arc::new(coldvault_processing::ImageThumbnailer::new()),
            config.thumbnail.clone(),
        )
    } else {
        pipeline
    };

    let services = ArchiveServices {
        uploads: Arc::new(UploadService::new(pipeline.clone())),
        chunked_uploads: Arc::new(ChunkedUploadService::new(
            pipeline,
            config.upload.clone(),
        )),
        retrievals: Arc::new(RetrievalService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
        )),
        session_cleanup: Arc::new(SessionCleanupService::new(
            Arc::clone(&store),
            Duration::from_secs(config.upload.session_cleanup_interval_secs),
        )),
        registry,
        store,
    };

    tracing::info!(
        environment = %config.environment,
        providers = ?services.registry.names(),
        "Archive services initialized"
    );
    Ok(services)
}
