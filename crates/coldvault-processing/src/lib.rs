//! Coldvault Processing Library
//!
//! CPU-bound work done on uploaded content: streamed content hashing for deduplication and
//! best-effort thumbnail generation.

pub mod hash;
pub mod thumbnail;

pub use hash::{compute_digest, digest_bytes, ContentDigest};
#[cfg(feature = "image")]
pub use thumbnail::ImageThumbnailer;
pub use thumbnail::{Thumbnailer, ThumbnailError, THUMBNAIL_CONTENT_TYPE};
