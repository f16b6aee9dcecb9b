//! Thumbnail generation
//!
//! Thumbnails are best-effort: callers log failures and carry on.

use async_trait::async_trait;
use bytes::Bytes;
use coldvault_core::constants::{THUMBNAIL_DIMENSION_RANGE, THUMBNAIL_QUALITY_RANGE};
use coldvault_core::AppError;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Every generated thumbnail is a JPEG.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid thumbnail argument: {0}")]
    InvalidArgument(String),

    #[error("Source image too large: {0} bytes")]
    SourceTooLarge(u64),

    #[error("Thumbnail encoding failed: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thumbnail task failed: {0}")]
    Task(String),
}

impl From<ThumbnailError> for AppError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::UnsupportedFormat(msg) => AppError::UnsupportedMediaType(msg),
            ThumbnailError::InvalidArgument(msg) => AppError::InvalidArgument(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Validate requested thumbnail dimensions and encoder quality.
pub fn validate_thumbnail_args(width: u32, height: u32, quality: u8) -> Result<(), ThumbnailError> {
    if !THUMBNAIL_DIMENSION_RANGE.contains(&width) || !THUMBNAIL_DIMENSION_RANGE.contains(&height)
    {
        return Err(ThumbnailError::InvalidArgument(format!(
            "width and height must be between {} and {}, got {}x{}",
            THUMBNAIL_DIMENSION_RANGE.start(),
            THUMBNAIL_DIMENSION_RANGE.end(),
            width,
            height
        )));
    }
    if !THUMBNAIL_QUALITY_RANGE.contains(&quality) {
        return Err(ThumbnailError::InvalidArgument(format!(
            "quality must be between {} and {}, got {}",
            THUMBNAIL_QUALITY_RANGE.start(),
            THUMBNAIL_QUALITY_RANGE.end(),
            quality
        )));
    }
    Ok(())
}

/// Thumbnail capability
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    fn is_supported(&self, mime_type: &str) -> bool;

    /// Read the source image to EOF and return a preview that fits within `width` x `height`.
    async fn generate(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Bytes, ThumbnailError>;
}

#[cfg(feature = "image")]
pub use image_impl::ImageThumbnailer;

#[cfg(feature = "image")]
mod image_impl {
    use std::io::Cursor;

    use async_trait::async_trait;
    use bytes::Bytes;
    use coldvault_core::models::ContentType;
    use image::codecs::jpeg::JpegEncoder;
    use image::ImageReader;
    use tokio::io::{AsyncRead, AsyncReadExt};

    use super::{validate_thumbnail_args, ThumbnailError, Thumbnailer};

    /// Sources larger than this are not decoded.
    const DEFAULT_MAX_SOURCE_BYTES: u64 = 100 * 1024 * 1024;

    /// [`Thumbnailer`] backed by the `image` crate. Decoding and encoding run on the
    /// blocking pool.
    pub struct ImageThumbnailer {
        max_source_bytes: u64,
    }

    impl Default for ImageThumbnailer {
        fn default() -> Self {
            ImageThumbnailer {
                max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            }
        }
    }

    impl ImageThumbnailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_max_source_bytes(max_source_bytes: u64) -> Self {
            ImageThumbnailer { max_source_bytes }
        }

        fn render(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, ThumbnailError> {
            let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
            let format = reader
                .format()
                .ok_or_else(|| ThumbnailError::UnsupportedFormat("unrecognized image data".to_string()))?;
            let img = reader
                .decode()
                .map_err(|e| ThumbnailError::UnsupportedFormat(format!("{:?}: {}", format, e)))?;

            // `thumbnail` preserves aspect ratio and fits within the bounds
            let rgb = img.thumbnail(width, height).to_rgb8();

            let mut buffer = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
            Ok(buffer)
        }
    }

    #[async_trait]
    impl Thumbnailer for ImageThumbnailer {
        fn is_supported(&self, mime_type: &str) -> bool {
            ContentType::new(mime_type)
                .map(|ct| ct.supports_thumbnail())
                .unwrap_or(false)
        }

        async fn generate(
            &self,
            reader: &mut (dyn AsyncRead + Send + Unpin),
            width: u32,
            height: u32,
            quality: u8,
        ) -> Result<Bytes, ThumbnailError> {
            validate_thumbnail_args(width, height, quality)?;

            let mut data = Vec::new();
            let read = reader
                .take(self.max_source_bytes + 1)
                .read_to_end(&mut data)
                .await?;
            if read as u64 > self.max_source_bytes {
                return Err(ThumbnailError::SourceTooLarge(read as u64));
            }

            let encoded =
                tokio::task::spawn_blocking(move || Self::render(&data, width, height, quality))
                    .await
                    .map_err(|e| ThumbnailError::Task(e.to_string()))??;

            tracing::debug!(
                width,
                height,
                quality,
                size_bytes = encoded.len(),
                "Thumbnail generated"
            );
            Ok(Bytes::from(encoded))
        }
    }

}
