//! Cold-storage retrieval DTOs. Retrieval jobs live on the provider side; the core only
//! sees these snapshots.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Speed/cost tradeoff for restoring archived content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalTier {
    Bulk,
    Standard,
    Expedited,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::Bulk => "bulk",
            RetrievalTier::Standard => "standard",
            RetrievalTier::Expedited => "expedited",
        }
    }
}

impl Display for RetrievalTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bulk" => Ok(RetrievalTier::Bulk),
            "standard" => Ok(RetrievalTier::Standard),
            "expedited" => Ok(RetrievalTier::Expedited),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown retrieval tier: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Requested,
    InProgress,
    Ready,
    Failed,
}

/// Provider answer to a retrieval request. `retrieval_id` is optional because providers are
/// not trusted to always return one; the retrieval service refuses a missing id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub retrieval_id: Option<String>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub status: RetrievalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStatusDetail {
    pub status: RetrievalStatus,
    pub progress_percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
}
