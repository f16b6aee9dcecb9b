//! Configuration module
//!
//! [`ArchiveConfig::from_env`] reads the process environment (after loading `.env`). Every
//! sub-config implements `Default` with the same defaults the environment loader uses.

use std::collections::HashMap;
use std::env;

use crate::constants::{
    DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_SESSION_TTL_HOURS, DEFAULT_THUMBNAIL_HEIGHT,
    DEFAULT_THUMBNAIL_QUALITY, DEFAULT_THUMBNAIL_WIDTH, MAX_SESSION_TTL_HOURS,
    THUMBNAIL_DIMENSION_RANGE, THUMBNAIL_QUALITY_RANGE,
};
use crate::storage_types::StorageClass;
use crate::telemetry::LogFormat;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const LARGE_VIDEO_THRESHOLD_MB: u64 = 1024;
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_PROVIDER: &str = "local";

/// Record store connection settings. Without a URL the in-memory store is used.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: None,
            max_connections: MAX_CONNECTIONS,
            timeout_seconds: CONNECTION_TIMEOUT_SECS,
        }
    }
}

/// Which providers to build and how to reach them.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Provider names to register, e.g. `local`, `s3-standard`, `s3-deep-archive`, `memory`.
    pub providers: Vec<String>,
    pub local_storage_path: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            providers: vec![DEFAULT_PROVIDER.to_string()],
            local_storage_path: "./storage".to_string(),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
        }
    }
}

impl StorageConfig {
    pub fn uses_s3(&self) -> bool {
        self.providers
            .iter()
            .any(|name| StorageClass::from_provider_name(name).is_some())
    }
}

/// Category to provider routing table.
#[derive(Clone, Debug)]
pub struct SelectionConfig {
    pub default_provider: String,
    /// Instant-access provider for thumbnails. Falls back to the cheapest instant provider.
    pub thumbnail_provider: Option<String>,
    pub photo_providers: Vec<String>,
    pub large_video_providers: Vec<String>,
    pub other_providers: Vec<String>,
    pub large_video_threshold_bytes: u64,
    pub provider_costs: HashMap<String, f64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            default_provider: DEFAULT_PROVIDER.to_string(),
            thumbnail_provider: None,
            photo_providers: vec![StorageClass::DeepArchive.provider_name().to_string()],
            large_video_providers: vec![StorageClass::GlacierFlexibleRetrieval
                .provider_name()
                .to_string()],
            other_providers: vec![
                StorageClass::Standard.provider_name().to_string(),
                DEFAULT_PROVIDER.to_string(),
            ],
            large_video_threshold_bytes: LARGE_VIDEO_THRESHOLD_MB * 1024 * 1024,
            provider_costs: default_provider_costs(),
        }
    }
}

/// Per-1000-request list prices; only their ordering matters for selection.
fn default_provider_costs() -> HashMap<String, f64> {
    [
        ("local", 0.0),
        ("memory", 0.0),
        ("s3-standard", 0.005),
        ("s3-glacier-ir", 0.02),
        ("s3-glacier", 0.03),
        ("s3-deep-archive", 0.05),
    ]
    .into_iter()
    .map(|(name, cost)| (name.to_string(), cost))
    .collect()
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub chunk_size_bytes: u64,
    pub session_ttl_hours: i64,
    pub session_cleanup_interval_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            session_cleanup_interval_secs: SESSION_CLEANUP_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        ThumbnailConfig {
            enabled: true,
            width: DEFAULT_THUMBNAIL_WIDTH,
            height: DEFAULT_THUMBNAIL_HEIGHT,
            quality: DEFAULT_THUMBNAIL_QUALITY,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, Default)]
pub struct ArchiveConfig {
    pub environment: String,
    pub log_format: LogFormat,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub selection: SelectionConfig,
    pub upload: UploadConfig,
    pub thumbnail: ThumbnailConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[String]) -> Vec<String> {
    match env::var(key) {
        Ok(value) => parse_list(&value),
        Err(_) => default.to_vec(),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `name=cost,name=cost`.
fn parse_costs(value: &str) -> Result<HashMap<String, f64>, anyhow::Error> {
    parse_list(value)
        .into_iter()
        .map(|entry| {
            let (name, cost) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("PROVIDER_COSTS entry '{}' must be name=cost", entry))?;
            let cost: f64 = cost
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVIDER_COSTS cost for '{}' must be a number", name))?;
            Ok((name.trim().to_string(), cost))
        })
        .collect()
}

impl ArchiveConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let log_format = match env::var("LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").ok(),
            max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
        };

        let storage_defaults = StorageConfig::default();
        let storage = StorageConfig {
            providers: env_list("STORAGE_PROVIDERS", &storage_defaults.providers),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or(storage_defaults.local_storage_path),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
        };

        let selection_defaults = SelectionConfig::default();
        let mut provider_costs = selection_defaults.provider_costs;
        if let Ok(value) = env::var("PROVIDER_COSTS") {
            provider_costs.extend(parse_costs(&value)?);
        }
        let selection = SelectionConfig {
            default_provider: env::var("DEFAULT_STORAGE_PROVIDER")
                .unwrap_or(selection_defaults.default_provider),
            thumbnail_provider: env::var("THUMBNAIL_STORAGE_PROVIDER").ok(),
            photo_providers: env_list("PHOTO_PROVIDERS", &selection_defaults.photo_providers),
            large_video_providers: env_list(
                "LARGE_VIDEO_PROVIDERS",
                &selection_defaults.large_video_providers,
            ),
            other_providers: env_list("OTHER_PROVIDERS", &selection_defaults.other_providers),
            large_video_threshold_bytes: env_or("LARGE_VIDEO_THRESHOLD_MB", LARGE_VIDEO_THRESHOLD_MB)
                * 1024
                * 1024,
            provider_costs,
        };

        let upload = UploadConfig {
            chunk_size_bytes: env_or("UPLOAD_CHUNK_SIZE_BYTES", DEFAULT_CHUNK_SIZE_BYTES),
            session_ttl_hours: env_or("UPLOAD_SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS),
            session_cleanup_interval_secs: env_or(
                "SESSION_CLEANUP_INTERVAL_SECS",
                SESSION_CLEANUP_INTERVAL_SECS,
            ),
        };

        let thumbnail = ThumbnailConfig {
            enabled: env_or("THUMBNAIL_ENABLED", true),
            width: env_or("THUMBNAIL_WIDTH", DEFAULT_THUMBNAIL_WIDTH),
            height: env_or("THUMBNAIL_HEIGHT", DEFAULT_THUMBNAIL_HEIGHT),
            quality: env_or("THUMBNAIL_QUALITY", DEFAULT_THUMBNAIL_QUALITY),
        };

        Ok(ArchiveConfig {
            environment,
            log_format,
            database,
            storage,
            selection,
            upload,
            thumbnail,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.storage.providers.is_empty() {
            return Err(anyhow::anyhow!("STORAGE_PROVIDERS must name at least one provider"));
        }

        for name in &self.storage.providers {
            if name.is_empty() || name.contains(':') {
                return Err(anyhow::anyhow!(
                    "Invalid provider name '{}': must be non-empty and must not contain ':'",
                    name
                ));
            }
        }

        let enabled = |name: &str| self.storage.providers.iter().any(|p| p == name);

        if !enabled(&self.selection.default_provider) {
            return Err(anyhow::anyhow!(
                "DEFAULT_STORAGE_PROVIDER '{}' is not listed in STORAGE_PROVIDERS",
                self.selection.default_provider
            ));
        }

        if let Some(thumb) = &self.selection.thumbnail_provider {
            if !enabled(thumb) {
                return Err(anyhow::anyhow!(
                    "THUMBNAIL_STORAGE_PROVIDER '{}' is not listed in STORAGE_PROVIDERS",
                    thumb
                ));
            }
        }

        if self.storage.uses_s3() {
            if self.storage.s3_bucket.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_BUCKET must be set when an S3 provider is enabled"
                ));
            }
            if self.storage.s3_region.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_REGION or AWS_REGION must be set when an S3 provider is enabled"
                ));
            }
        }

        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.upload.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("UPLOAD_CHUNK_SIZE_BYTES must be greater than zero"));
        }
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.upload.session_ttl_hours) {
            return Err(anyhow::anyhow!(
                "UPLOAD_SESSION_TTL_HOURS must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            ));
        }
        if self.upload.session_cleanup_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "SESSION_CLEANUP_INTERVAL_SECS must be greater than zero"
            ));
        }

        if !THUMBNAIL_DIMENSION_RANGE.contains(&self.thumbnail.width)
            || !THUMBNAIL_DIMENSION_RANGE.contains(&self.thumbnail.height)
        {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_WIDTH and THUMBNAIL_HEIGHT must be between 1 and 5000"
            ));
        }
        if !THUMBNAIL_QUALITY_RANGE.contains(&self.thumbnail.quality) {
            return Err(anyhow::anyhow!("THUMBNAIL_QUALITY must be between 1 and 100"));
        }

        Ok(())
    }
}
