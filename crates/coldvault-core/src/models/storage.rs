//! Storage location model: provider-agnostic reference to where a file is stored.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// A (provider name, opaque path) pair. The provider name is the discriminator used to
/// resolve the storage provider that owns the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub provider: String,
    pub path: String,
}

impl StorageLocation {
    pub fn new(provider: impl Into<String>, path: impl Into<String>) -> Self {
        StorageLocation {
            provider: provider.into(),
            path: path.into(),
        }
    }
}

impl Display for StorageLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}://{}", self.provider, self.path)
    }
}
