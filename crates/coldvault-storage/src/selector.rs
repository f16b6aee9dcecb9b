//! Provider registry and selection policy.
//!
//! The registry is an explicit `name -> provider` map built at startup. Selection is a pure
//! function of (category, size, preference) over that map; it performs no I/O.

use std::collections::HashMap;
use std::sync::Arc;

use coldvault_core::models::{ContentCategory, StorageLocation};
use coldvault_core::SelectionConfig;

use crate::traits::{HealthStatus, StorageError, StorageProvider, StorageResult};

struct RegisteredProvider {
    provider: Arc<dyn StorageProvider>,
    enabled: bool,
    cost_per_request: f64,
}

/// Registered providers keyed by name, in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, RegisteredProvider>,
    order: Vec<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enabled provider. Names must be unique, non-empty and free of `:`.
    pub fn register(
        &mut self,
        provider: Arc<dyn StorageProvider>,
        cost_per_request: f64,
    ) -> StorageResult<()> {
        let name = provider.name().to_string();
        if name.is_empty() || name.contains(':') {
            return Err(StorageError::ConfigError(format!(
                "Invalid provider name '{}': must be non-empty and must not contain ':'",
                name
            )));
        }
        if self.providers.contains_key(&name) {
            return Err(StorageError::ConfigError(format!(
                "Provider '{}' is already registered",
                name
            )));
        }

        tracing::debug!(provider = %name, cost_per_request, "Registered storage provider");
        self.order.push(name.clone());
        self.providers.insert(
            name,
            RegisteredProvider {
                provider,
                enabled: true,
                cost_per_request,
            },
        );
        Ok(())
    }

    /// Disabled providers are skipped by selection but still serve existing objects.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> StorageResult<()> {
        let entry = self
            .providers
            .get_mut(name)
            .ok_or_else(|| StorageError::ConfigError(format!("Unknown provider '{}'", name)))?;
        entry.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StorageProvider>> {
        self.providers.get(name).map(|p| Arc::clone(&p.provider))
    }

    fn get_enabled(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.get(name).filter(|p| p.enabled)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get_enabled(name).is_some()
    }

    /// Provider owning `location`, enabled or not.
    pub fn resolve(&self, location: &StorageLocation) -> StorageResult<Arc<dyn StorageProvider>> {
        self.get(&location.provider).ok_or_else(|| {
            StorageError::NoProviderAvailable(format!(
                "provider '{}' is not registered",
                location.provider
            ))
        })
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Probe every registered provider concurrently.
    pub async fn check_health(&self) -> Vec<(String, HealthStatus)> {
        let probes = self.order.iter().filter_map(|name| {
            self.providers.get(name).map(|entry| {
                let provider = Arc::clone(&entry.provider);
                let name = name.clone();
                async move { (name, provider.check_health().await) }
            })
        });
        futures::future::join_all(probes).await
    }
}

/// Category to candidate-provider table.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub default_provider: String,
    pub thumbnail_provider: Option<String>,
    pub photo: Vec<String>,
    pub large_video: Vec<String>,
    pub other: Vec<String>,
    pub large_video_threshold: u64,
}

impl From<&SelectionConfig> for SelectionPolicy {
    fn from(config: &SelectionConfig) -> Self {
        SelectionPolicy {
            default_provider: config.default_provider.clone(),
            thumbnail_provider: config.thumbnail_provider.clone(),
            photo: config.photo_providers.clone(),
            large_video: config.large_video_providers.clone(),
            other: config.other_providers.clone(),
            large_video_threshold: config.large_video_threshold_bytes,
        }
    }
}

impl SelectionPolicy {
    fn candidates(&self, category: ContentCategory, size: u64) -> &[String] {
        match category {
            ContentCategory::Photo => &self.photo,
            ContentCategory::Video if size >= self.large_video_threshold => &self.large_video,
            ContentCategory::Video => &self.other,
        }
    }
}

/// Resolves providers for uploads and thumbnails.
#[derive(Clone)]
pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    policy: SelectionPolicy,
}

impl ProviderSelector {
    pub fn new(registry: Arc<ProviderRegistry>, policy: SelectionPolicy) -> Self {
        ProviderSelector { registry, policy }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Pick the provider for a new upload.
    ///
    /// 1. An enabled `preference` wins.
    /// 2. Otherwise the cheapest enabled candidate for the category; equal costs keep table order.
    /// 3. Otherwise the default provider, if enabled.
    pub fn select(
        &self,
        category: ContentCategory,
        size: u64,
        preference: Option<&str>,
    ) -> StorageResult<Arc<dyn StorageProvider>> {
        if let Some(name) = preference {
            if let Some(entry) = self.registry.get_enabled(name) {
                return Ok(Arc::clone(&entry.provider));
            }
            tracing::debug!(preference = %name, "Preferred provider is not enabled, using policy");
        }

        let mut best: Option<&RegisteredProvider> = None;
        for name in self.policy.candidates(category, size) {
            if let Some(entry) = self.registry.get_enabled(name) {
                if best.map_or(true, |b| entry.cost_per_request < b.cost_per_request) {
                    best = Some(entry);
                }
            }
        }
        if let Some(entry) = best {
            return Ok(Arc::clone(&entry.provider));
        }

        if let Some(entry) = self.registry.get_enabled(&self.policy.default_provider) {
            tracing::debug!(
                category = %category,
                provider = %self.policy.default_provider,
                "No category provider enabled, using default provider"
            );
            return Ok(Arc::clone(&entry.provider));
        }

        Err(StorageError::NoProviderAvailable(format!(
            "no enabled provider for {} content and default provider '{}' is unavailable",
            category, self.policy.default_provider
        )))
    }

    /// Instant-access provider used for thumbnails: the configured one if it is enabled and
    /// instant, else the cheapest enabled instant provider (registration order breaks ties).
    pub fn instant_access_provider(&self) -> StorageResult<Arc<dyn StorageProvider>> {
        if let Some(name) = &self.policy.thumbnail_provider {
            if let Some(entry) = self.registry.get_enabled(name) {
                if entry.provider.capabilities().supports_instant_access {
                    return Ok(Arc::clone(&entry.provider));
                }
            }
        }

        let mut best: Option<&RegisteredProvider> = None;
        for name in self.registry.names() {
            if let Some(entry) = self.registry.get_enabled(name) {
                if entry.provider.capabilities().supports_instant_access
                    && best.map_or(true, |b| entry.cost_per_request < b.cost_per_request)
                {
                    best = Some(entry);
                }
            }
        }

        best.map(|entry| Arc::clone(&entry.provider)).ok_or_else(|| {
            StorageError::NoProviderAvailable("no instant-access provider is enabled".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use std::time::Duration;

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            default_provider: "local".to_string(),
            thumbnail_provider: None,
            photo: vec!["deep".to_string()],
            large_video: vec!["glacier".to_string()],
            other: vec!["standard".to_string(), "local".to_string()],
            large_video_threshold: 1_000,
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(MemoryStorage::instant("local")), 0.0)
            .unwrap();
        registry
            .register(Arc::new(MemoryStorage::instant("standard")), 0.005)
            .unwrap();
        registry
            .register(
                Arc::new(MemoryStorage::archival("glacier", Duration::ZERO)),
                0.03,
            )
            .unwrap();
        registry
            .register(Arc::new(MemoryStorage::archival("deep", Duration::ZERO)), 0.05)
            .unwrap();
        registry
    }

    fn selector(registry: ProviderRegistry) -> ProviderSelector {
        ProviderSelector::new(Arc::new(registry), policy())
    }

    #[test]
    fn test_category_table() {
        let selector = selector(registry());
        assert_eq!(
            selector.select(ContentCategory::Photo, 10, None).unwrap().name(),
            "deep"
        );
        assert_eq!(
            selector.select(ContentCategory::Video, 5_000, None).unwrap().name(),
            "glacier"
        );
        // cheapest of standard/local
        assert_eq!(
            selector.select(ContentCategory::Video, 10, None).unwrap().name(),
            "local"
        );
    }

    #[test]
    fn test_enabled_preference_wins() {
        let selector = selector(registry());
        assert_eq!(
            selector
                .select(ContentCategory::Photo, 10, Some("standard"))
                .unwrap()
                .name(),
            "standard"
        );
        // unknown preference falls through to the table
        assert_eq!(
            selector
                .select(ContentCategory::Photo, 10, Some("nope"))
                .unwrap()
                .name(),
            "deep"
        );
    }

    #[test]
    fn test_disabled_candidate_falls_back_to_default() {
        let mut registry = registry();
        registry.set_enabled("deep", false).unwrap();
        let selector = selector(registry);
        assert_eq!(
            selector.select(ContentCategory::Photo, 10, None).unwrap().name(),
            "local"
        );
        assert!(selector.registry().get("deep").is_some());
    }

    #[test]
    fn test_no_provider_available() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(MemoryStorage::instant("other")), 0.0)
            .unwrap();
        registry.set_enabled("other", false).unwrap();
        let selector = selector(registry);
        assert!(matches!(
            selector.select(ContentCategory::Photo, 10, None),
            Err(StorageError::NoProviderAvailable(_))
        ));
        assert!(selector.instant_access_provider().is_err());
    }

    #[test]
    fn test_equal_cost_keeps_table_order() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(MemoryStorage::instant("local")), 0.0)
            .unwrap();
        registry
            .register(Arc::new(MemoryStorage::instant("standard")), 0.0)
            .unwrap();
        let selector = selector(registry);
        assert_eq!(
            selector.select(ContentCategory::Video, 10, None).unwrap().name(),
            "standard"
        );
    }

    #[test]
    fn test_instant_access_provider_skips_archival() {
        let selector = selector(registry());
        assert_eq!(selector.instant_access_provider().unwrap().name(), "local");

        let mut policy = policy();
        policy.thumbnail_provider = Some("deep".to_string());
        let selector = ProviderSelector::new(Arc::new(self::registry()), policy);
        assert_eq!(selector.instant_access_provider().unwrap().name(), "local");
    }

    #[test]
    fn test_registration_rejects_bad_names() {
        let mut registry = ProviderRegistry::new();
        assert!(registry
            .register(Arc::new(MemoryStorage::instant("a:b")), 0.0)
            .is_err());
        registry
            .register(Arc::new(MemoryStorage::instant("a")), 0.0)
            .unwrap();
        assert!(registry
            .register(Arc::new(MemoryStorage::instant("a")), 0.0)
            .is_err());
    }

    #[tokio::test]
    async fn test_health_checks_every_provider() {
        let registry = registry();
        let report = registry.check_health().await;
        assert_eq!(report.len(), 4);
        assert!(report.iter().all(|(_, status)| status.is_healthy));
    }
}
