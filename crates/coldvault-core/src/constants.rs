//! Domain-wide constants.

/// Largest file the archive accepts (5 GiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Default chunk size for chunked upload sessions (5 MiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Upload sessions expire this many hours after creation.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// Longest session lifetime the configuration accepts (30 days).
pub const MAX_SESSION_TTL_HOURS: i64 = 30 * 24;

pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 300;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 300;
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 85;

/// Valid range for thumbnail width and height.
pub const THUMBNAIL_DIMENSION_RANGE: std::ops::RangeInclusive<u32> = 1..=5000;
/// Valid range for thumbnail encoder quality.
pub const THUMBNAIL_QUALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

/// Storage category used for thumbnail objects.
pub const THUMBNAIL_CATEGORY: &str = "thumbnails";

/// Prefix of the digest assigned to chunked uploads until the real content is known.
pub const PLACEHOLDER_DIGEST_PREFIX: &str = "pending:";

pub const MAX_FILENAME_LENGTH: usize = 255;
