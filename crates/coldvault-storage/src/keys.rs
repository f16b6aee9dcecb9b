//! Shared key generation for storage providers.
//!
//! Key format: `{category}/{yyyy}/{mm}/{dd}/{random-id}_{sanitized-name}`.

use chrono::{DateTime, Datelike, Utc};
use coldvault_core::validation::sanitize_filename;
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Generate a storage key. The random component keeps keys unique even for identical names.
pub fn generate_storage_key(category: &str, file_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}_{}",
        category,
        now.year(),
        now.month(),
        now.day(),
        Uuid::new_v4().simple(),
        sanitize_filename(file_name)
    )
}

/// Reject keys that could escape a provider's namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key '{}' contains invalid characters",
            key
        )));
    }
    Ok(())
}
