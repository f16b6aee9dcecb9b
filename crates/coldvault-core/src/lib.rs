//! Coldvault Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and validation
//! shared by every coldvault component: the file record aggregate and its upload state
//! machine, chunked upload sessions, retrieval DTOs and domain events.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use config::{
    ArchiveConfig, DatabaseConfig, SelectionConfig, StorageConfig, ThumbnailConfig, UploadConfig,
};
pub use error::{AppError, ErrorCategory, LogLevel};
pub use storage_types::{StorageBackend, StorageClass};
pub use telemetry::{init_tracing, LogFormat};
// Note: StorageProvider, StorageError and the provider registry live in coldvault-storage
