use std::sync::Arc;

use coldvault_core::{ArchiveConfig, StorageClass};

#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{MemoryStorage, ProviderRegistry, StorageBackend, StorageError, StorageProvider, StorageResult};

/// Backend implied by a provider name.
fn backend_for(name: &str) -> StorageResult<StorageBackend> {
    if StorageClass::from_provider_name(name).is_some() {
        return Ok(StorageBackend::S3);
    }
    name.parse::<StorageBackend>()
        .ok()
        .filter(|backend| *backend != StorageBackend::S3)
        .ok_or_else(|| StorageError::ConfigError(format!("Unknown storage provider '{}'", name)))
}

async fn create_provider(
    name: &str,
    config: &ArchiveConfig,
) -> StorageResult<Arc<dyn StorageProvider>> {
    match backend_for(name)? {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let class = StorageClass::from_provider_name(name).ok_or_else(|| {
                StorageError::ConfigError(format!("Unknown S3 provider '{}'", name))
            })?;
            let bucket = config
                .storage
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.storage.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let storage =
                S3Storage::new(class, bucket, region, config.storage.s3_endpoint.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let storage = LocalStorage::new(name, &config.storage.local_storage_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!(provider = %name, "Using in-memory storage; objects are lost on restart");
            Ok(Arc::new(MemoryStorage::instant(name)))
        }
    }
}

/// Build and register every provider named in `STORAGE_PROVIDERS`.
pub async fn build_registry(config: &ArchiveConfig) -> StorageResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    for name in &config.storage.providers {
        let provider = create_provider(name, config).await?;
        let cost = config
            .selection
            .provider_costs
            .get(name)
            .copied()
            .unwrap_or_default();
        registry.register(provider, cost)?;
    }

    if registry.is_empty() {
        return Err(StorageError::NoProviderAvailable(
            "no storage providers configured".to_string(),
        ));
    }

    tracing::info!(providers = ?registry.names(), "Storage providers registered");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_for_provider_names() {
        assert_eq!(backend_for("s3-deep-archive").unwrap(), StorageBackend::S3);
        assert_eq!(backend_for("local").unwrap(), StorageBackend::Local);
        assert_eq!(backend_for("memory").unwrap(), StorageBackend::Memory);
        assert!(backend_for("s3").is_err());
        assert!(backend_for("nfs").is_err());
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_build_registry_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ArchiveConfig::default();
        config.storage.providers = vec!["local".to_string(), "memory".to_string()];
        config.storage.local_storage_path = dir.path().display().to_string();

        let registry = build_registry(&config).await.unwrap();
        assert_eq!(registry.names(), ["local".to_string(), "memory".to_string()]);
        assert!(registry.get("memory").is_some());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let mut config = ArchiveConfig::default();
        config.storage.providers = vec!["ftp".to_string()];
        assert!(matches!(
            build_registry(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
