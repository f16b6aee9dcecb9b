use serde::{Deserialize, Serialize};

use crate::constants::MAX_FILE_SIZE_BYTES;
use crate::error::AppError;

/// Size of a stored file in bytes, always within `1..=5 GiB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct FileSize(u64);

impl FileSize {
    pub fn new(bytes: i64) -> Result<Self, AppError> {
        if bytes < 1 || bytes as u64 > MAX_FILE_SIZE_BYTES {
            return Err(AppError::InvalidFileSize {
                size: bytes,
                max: MAX_FILE_SIZE_BYTES,
            });
        }
        Ok(FileSize(bytes as u64))
    }

    pub fn from_bytes(bytes: u64) -> Result<Self, AppError> {
        let signed = i64::try_from(bytes).map_err(|_| AppError::InvalidFileSize {
            size: i64::MAX,
            max: MAX_FILE_SIZE_BYTES,
        })?;
        Self::new(signed)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl TryFrom<i64> for FileSize {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        FileSize::new(value)
    }
}

impl From<FileSize> for i64 {
    fn from(size: FileSize) -> Self {
        size.0 as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_and_negative() {
        assert!(matches!(
            FileSize::new(0),
            Err(AppError::InvalidFileSize { size: 0, .. })
        ));
        assert!(FileSize::new(-1).is_err());
    }

    #[test]
    fn test_rejects_more_than_five_gib() {
        assert!(FileSize::new(MAX_FILE_SIZE_BYTES as i64 + 1).is_err());
        assert!(FileSize::from_bytes(u64::MAX).is_err());
    }

    #[test]
    fn test_accepts_bounds() {
        assert_eq!(FileSize::new(1).unwrap().bytes(), 1);
        assert_eq!(
            FileSize::new(MAX_FILE_SIZE_BYTES as i64).unwrap().bytes(),
            MAX_FILE_SIZE_BYTES
        );
    }
}
