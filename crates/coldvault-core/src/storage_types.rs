use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// Defined in core because configuration selects backends by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Object storage class. Instant classes serve reads immediately; archival classes
/// require a restore before the bytes can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    GlacierInstantRetrieval,
    GlacierFlexibleRetrieval,
    DeepArchive,
}

impl StorageClass {
    pub fn is_archival(&self) -> bool {
        matches!(
            self,
            StorageClass::GlacierFlexibleRetrieval | StorageClass::DeepArchive
        )
    }

    /// Conventional provider name for an S3 bucket using this class.
    pub fn provider_name(&self) -> &'static str {
        match self {
            StorageClass::Standard => "s3-standard",
            StorageClass::GlacierInstantRetrieval => "s3-glacier-ir",
            StorageClass::GlacierFlexibleRetrieval => "s3-glacier",
            StorageClass::DeepArchive => "s3-deep-archive",
        }
    }

    /// Inverse of [`StorageClass::provider_name`].
    pub fn from_provider_name(name: &str) -> Option<Self> {
        match name {
            "s3-standard" => Some(StorageClass::Standard),
            "s3-glacier-ir" => Some(StorageClass::GlacierInstantRetrieval),
            "s3-glacier" => Some(StorageClass::GlacierFlexibleRetrieval),
            "s3-deep-archive" => Some(StorageClass::DeepArchive),
            _ => None,
        }
    }
}

impl FromStr for StorageClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STANDARD" => Ok(StorageClass::Standard),
            "GLACIER_IR" => Ok(StorageClass::GlacierInstantRetrieval),
            "GLACIER" => Ok(StorageClass::GlacierFlexibleRetrieval),
            "DEEP_ARCHIVE" => Ok(StorageClass::DeepArchive),
            _ => Err(anyhow::anyhow!("Invalid storage class: {}", s)),
        }
    }
}

impl Display for StorageClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageClass::Standard => write!(f, "STANDARD"),
            StorageClass::GlacierInstantRetrieval => write!(f, "GLACIER_IR"),
            StorageClass::GlacierFlexibleRetrieval => write!(f, "GLACIER"),
            StorageClass::DeepArchive => write!(f, "DEEP_ARCHIVE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_class_round_trips_through_provider_name() {
        for class in [
            StorageClass::Standard,
            StorageClass::GlacierInstantRetrieval,
            StorageClass::GlacierFlexibleRetrieval,
            StorageClass::DeepArchive,
        ] {
            assert_eq!(
                StorageClass::from_provider_name(class.provider_name()),
                Some(class)
            );
        }
        assert_eq!(StorageClass::from_provider_name("local"), None);
    }

    #[test]
    fn test_only_flexible_and_deep_archive_are_archival() {
        assert!(!StorageClass::Standard.is_archival());
        assert!(!StorageClass::GlacierInstantRetrieval.is_archival());
        assert!(StorageClass::GlacierFlexibleRetrieval.is_archival());
        assert!(StorageClass::DeepArchive.is_archival());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert!("nfs".parse::<StorageBackend>().is_err());
    }
}
