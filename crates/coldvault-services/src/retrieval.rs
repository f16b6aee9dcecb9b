//! Cold-storage retrieval orchestration
//!
//! Archival providers need a restore job before their objects can be read. This service
//! starts those jobs, relays their status and streams downloads. It does not check restore
//! state before a download: the provider reports an unrestored object as
//! `RetrievalRequired`.

use std::sync::Arc;

use coldvault_core::models::{FileRecord, RetrievalStatusDetail, RetrievalTier, StorageLocation};
use coldvault_core::AppError;
use coldvault_db::RecordStore;
use coldvault_storage::{ProviderRegistry, StorageProvider};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancellation::run_cancellable;
use crate::outcome::{DownloadOutcome, RetrievalOutcome};

/// Separator between provider name and provider retrieval id in a retrieval handle.
const HANDLE_SEPARATOR: char = ':';

fn parse_handle(handle: &str) -> Result<(&str, &str), AppError> {
    match handle.split_once(HANDLE_SEPARATOR) {
        Some((provider, id)) if !provider.is_empty() && !id.is_empty() => Ok((provider, id)),
        _ => Err(AppError::InvalidArgument(format!(
            "malformed retrieval id '{}', expected 'provider:id'",
            handle
        ))),
    }
}

#[derive(Clone)]
pub struct RetrievalService {
    store: Arc<dyn RecordStore>,
    registry: Arc<ProviderRegistry>,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    /// Load a record that has been written to a provider.
    async fn uploaded_record(
        &self,
        file_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(FileRecord, StorageLocation, Arc<dyn StorageProvider>), AppError> {
        let record = run_cancellable(cancel, self.store.get_by_id(file_id))
            .await?
            .ok_or(AppError::FileNotFound(file_id))?;
        let location = record
            .location()
            .cloned()
            .ok_or(AppError::FileNotUploaded(file_id))?;
        let provider = self.registry.resolve(&location)?;
        Ok((record, location, provider))
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn initiate_retrieval(
        &self,
        file_id: Uuid,
        tier: RetrievalTier,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome, AppError> {
        let (_, location, provider) = self.uploaded_record(file_id, cancel).await?;
        if !provider.capabilities().supports_retrieval {
            return Err(AppError::UnsupportedOperation(format!(
                "provider '{}' serves files instantly; no retrieval is needed",
                provider.name()
            )));
        }

        let result = run_cancellable(cancel, async {
            provider
                .initiate_retrieval(&location, tier)
                .await
                .map_err(|e| e.into_app_error(provider.name()))
        })
        .await?;

        let Some(provider_id) = result.retrieval_id else {
            tracing::error!(
                file_id = %file_id,
                provider = %provider.name(),
                "Provider reported a retrieval without an id"
            );
            return Err(AppError::RetrievalIdMissing);
        };

        tracing::info!(
            file_id = %file_id,
            provider = %provider.name(),
            tier = %tier,
            retrieval_id = %provider_id,
            status = ?result.status,
            "Retrieval initiated"
        );

        Ok(RetrievalOutcome {
            retrieval_id: format!("{}{}{}", provider.name(), HANDLE_SEPARATOR, provider_id),
            estimated_completion_at: result.estimated_completion_at,
            status: result.status,
        })
    }

    /// Status of a retrieval started by [`RetrievalService::initiate_retrieval`].
    #[tracing::instrument(skip(self, cancel))]
    pub async fn check_retrieval_status(
        &self,
        retrieval_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RetrievalStatusDetail, AppError> {
        let (provider_name, provider_id) = parse_handle(retrieval_id)?;
        let provider = self.registry.get(provider_name).ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "retrieval id refers to unknown provider '{}'",
                provider_name
            ))
        })?;

        run_cancellable(cancel, async {
            provider
                .retrieval_status(provider_id)
                .await
                .map_err(|e| e.into_app_error(provider.name()))
        })
        .await
    }

    /// Stream a file from its provider.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn download_file(
        &self,
        file_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, AppError> {
        let (record, location, provider) = self.uploaded_record(file_id, cancel).await?;

        let stream = run_cancellable(cancel, async {
            provider
                .download(&location)
                .await
                .map_err(|e| e.into_app_error(provider.name()))
        })
        .await?;

        Ok(DownloadOutcome {
            stream,
            file_name: record.metadata().original_name().to_string(),
            mime_type: record.content_type().mime_type().to_string(),
            size: record.size().bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle() {
        assert_eq!(
            parse_handle("s3-glacier:Standard.1700000000.a2V5").unwrap(),
            ("s3-glacier", "Standard.1700000000.a2V5")
        );
        assert!(parse_handle("no-separator").is_err());
        assert!(parse_handle(":id").is_err());
        assert!(parse_handle("provider:").is_err());
    }
}
