//! Static capability descriptors.

use std::time::Duration;

use coldvault_core::StorageClass;

const HOUR: u64 = 60 * 60;

/// What a provider can do and how long reads may be delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub supports_instant_access: bool,
    pub supports_retrieval: bool,
    pub supports_deletion: bool,
    pub min_retrieval_time: Duration,
    pub max_retrieval_time: Duration,
}

impl ProviderCapabilities {
    /// Reads are served immediately.
    pub const fn instant() -> Self {
        ProviderCapabilities {
            supports_instant_access: true,
            supports_retrieval: false,
            supports_deletion: true,
            min_retrieval_time: Duration::ZERO,
            max_retrieval_time: Duration::ZERO,
        }
    }

    /// Reads require a restore that completes within `min..=max`.
    pub const fn archival(min: Duration, max: Duration) -> Self {
        ProviderCapabilities {
            supports_instant_access: false,
            supports_retrieval: true,
            supports_deletion: true,
            min_retrieval_time: min,
            max_retrieval_time: max,
        }
    }

    pub fn for_storage_class(class: StorageClass) -> Self {
        match class {
            StorageClass::Standard | StorageClass::GlacierInstantRetrieval => Self::instant(),
            StorageClass::GlacierFlexibleRetrieval => {
                Self::archival(Duration::from_secs(60), Duration::from_secs(12 * HOUR))
            }
            StorageClass::DeepArchive => {
                Self::archival(Duration::from_secs(12 * HOUR), Duration::from_secs(48 * HOUR))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archival_classes_support_retrieval() {
        let deep = ProviderCapabilities::for_storage_class(StorageClass::DeepArchive);
        assert!(deep.supports_retrieval);
        assert!(!deep.supports_instant_access);
        assert_eq!(deep.max_retrieval_time, Duration::from_secs(48 * HOUR));

        let ir = ProviderCapabilities::for_storage_class(StorageClass::GlacierInstantRetrieval);
        assert!(ir.supports_instant_access);
        assert!(!ir.supports_retrieval);
    }
}
