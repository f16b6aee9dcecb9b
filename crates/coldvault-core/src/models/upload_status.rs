use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Upload lifecycle of a file record.
///
/// ```text
/// Pending -> Uploading -> Completed -> Archived
///                      \-> Failed -> Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Pending,
    Uploading,
    Completed,
    Failed,
    Archived,
}

impl UploadState {
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Completed, Archived)
                | (Failed, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Pending => "pending",
            UploadState::Uploading => "uploading",
            UploadState::Completed => "completed",
            UploadState::Failed => "failed",
            UploadState::Archived => "archived",
        }
    }
}

impl Display for UploadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadState::Pending),
            "uploading" => Ok(UploadState::Uploading),
            "completed" => Ok(UploadState::Completed),
            "failed" => Ok(UploadState::Failed),
            "archived" => Ok(UploadState::Archived),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown upload state: {}",
                other
            ))),
        }
    }
}

/// Current upload state together with the time it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    state: UploadState,
    changed_at: DateTime<Utc>,
}

impl UploadStatus {
    pub fn pending(at: DateTime<Utc>) -> Self {
        UploadStatus {
            state: UploadState::Pending,
            changed_at: at,
        }
    }

    /// Rebuild a status loaded from persistence.
    pub fn restore(state: UploadState, changed_at: DateTime<Utc>) -> Self {
        UploadStatus { state, changed_at }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    /// Returns the status after moving to `next`. `self` is left untouched on error.
    pub fn transition(&self, next: UploadState, at: DateTime<Utc>) -> Result<Self, AppError> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(UploadStatus {
            state: next,
            changed_at: at,
        })
    }
}
