//! Coldvault Storage Library
//!
//! Storage capability providers and the registry that selects between them.
//!
//! Every backing store, instant-access or archival, implements [`StorageProvider`] and
//! describes itself with a static [`ProviderCapabilities`]. Orchestration code only branches
//! on capabilities, never on which vendor sits behind a provider.
//!
//! # Storage key format
//!
//! All providers generate keys the same way: `{category}/{yyyy}/{mm}/{dd}/{random-id}_{name}`.
//! Keys must not contain `..` or a leading `/`. See the `keys` module.

pub mod capabilities;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod selector;
pub mod traits;

// Re-export commonly used types
pub use capabilities::ProviderCapabilities;
pub use coldvault_core::StorageBackend;
pub use factory::build_registry;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use selector::{ProviderRegistry, ProviderSelector, SelectionPolicy};
pub use traits::{
    ByteStream, HealthStatus, StorageError, StorageProvider, StorageResult, UploadRequest,
};
