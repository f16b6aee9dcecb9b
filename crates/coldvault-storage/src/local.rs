use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use coldvault_core::models::StorageLocation;
use futures::StreamExt;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::capabilities::ProviderCapabilities;
use crate::keys::{generate_storage_key, validate_key};
use crate::traits::{
    ByteStream, HealthStatus, StorageError, StorageProvider, StorageResult, UploadRequest,
};
use crate::StorageBackend;

const LOCAL_CAPABILITIES: ProviderCapabilities = ProviderCapabilities::instant();

/// Local filesystem storage provider
#[derive(Clone)]
pub struct LocalStorage {
    name: String,
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`, creating the directory if needed.
    pub async fn new(name: impl Into<String>, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            name: name.into(),
            base_path,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys containing traversal sequences, and keys whose existing target resolves
    /// outside the base directory (e.g. through a symlink).
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Copy `reader` into `file` and flush it to disk.
async fn write_durably(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    file: &mut fs::File,
) -> std::io::Result<u64> {
    let written = tokio::io::copy(reader, file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &LOCAL_CAPABILITIES
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<StorageLocation> {
        let key = generate_storage_key(&request.category, &request.file_name, Utc::now());
        let path = self.key_to_path(&key)?;
        let start = Instant::now();

        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let written = match write_durably(reader, &mut file).await {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(StorageError::UploadFailed(format!(
                    "Failed to write file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        tracing::info!(
            provider = %self.name,
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(StorageLocation::new(&self.name, key))
    }

    async fn download(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        let path = self.key_to_path(&location.path)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(location.path.clone()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        tracing::debug!(provider = %self.name, key = %location.path, "Local storage download started");

        let key = location.path.clone();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(key = %key, error = %e, "Local storage stream download error");
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, location: &StorageLocation) -> StorageResult<bool> {
        let path = self.key_to_path(&location.path)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(provider = %self.name, key = %location.path, "Local storage delete successful");
        Ok(true)
    }

    async fn check_health(&self) -> HealthStatus {
        let start = Instant::now();
        match fs::metadata(&self.base_path).await {
            Ok(meta) if meta.is_dir() => HealthStatus::healthy(start.elapsed()),
            Ok(_) => HealthStatus::unhealthy(
                start.elapsed(),
                format!("{} is not a directory", self.base_path.display()),
            ),
            Err(e) => HealthStatus::unhealthy(start.elapsed(), e.to_string()),
        }
    }
}
