use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Broad content class of an archived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Photo,
    Video,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Photo => "photo",
            ContentCategory::Video => "video",
        }
    }
}

impl Display for ContentCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "photo" => Ok(ContentCategory::Photo),
            "video" => Ok(ContentCategory::Video),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown content category: {}",
                other
            ))),
        }
    }
}

/// Known MIME types: (mime, category, thumbnail supported).
const KNOWN_TYPES: &[(&str, ContentCategory, bool)] = &[
    ("image/jpeg", ContentCategory::Photo, true),
    ("image/png", ContentCategory::Photo, true),
    ("image/gif", ContentCategory::Photo, true),
    ("image/webp", ContentCategory::Photo, true),
    ("image/tiff", ContentCategory::Photo, true),
    ("image/bmp", ContentCategory::Photo, true),
    ("image/heic", ContentCategory::Photo, false),
    ("image/heif", ContentCategory::Photo, false),
    ("image/x-adobe-dng", ContentCategory::Photo, false),
    ("video/mp4", ContentCategory::Video, false),
    ("video/quicktime", ContentCategory::Video, false),
    ("video/x-msvideo", ContentCategory::Video, false),
    ("video/webm", ContentCategory::Video, false),
    ("video/x-matroska", ContentCategory::Video, false),
    ("video/3gpp", ContentCategory::Video, false),
    ("video/mpeg", ContentCategory::Video, false),
];

/// A MIME type validated against the known-type table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    mime_type: String,
    category: ContentCategory,
}

impl ContentType {
    /// Parse a MIME type, ignoring parameters (`image/jpeg; q=1`) and case.
    pub fn new(mime_type: &str) -> Result<Self, AppError> {
        let normalized = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let normalized = match normalized.as_str() {
            "image/jpg" => "image/jpeg".to_string(),
            _ => normalized,
        };

        KNOWN_TYPES
            .iter()
            .find(|(mime, _, _)| *mime == normalized)
            .map(|(mime, category, _)| ContentType {
                mime_type: (*mime).to_string(),
                category: *category,
            })
            .ok_or_else(|| AppError::UnsupportedMediaType(mime_type.to_string()))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn category(&self) -> ContentCategory {
        self.category
    }

    /// Whether a preview image can be derived from this content.
    pub fn supports_thumbnail(&self) -> bool {
        KNOWN_TYPES
            .iter()
            .any(|(mime, _, thumb)| *mime == self.mime_type && *thumb)
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types_are_classified() {
        let jpeg = ContentType::new("image/jpeg").unwrap();
        assert_eq!(jpeg.category(), ContentCategory::Photo);
        assert!(jpeg.supports_thumbnail());

        let mov = ContentType::new("video/quicktime").unwrap();
        assert_eq!(mov.category(), ContentCategory::Video);
        assert!(!mov.supports_thumbnail());
    }

    #[test]
    fn test_normalizes_case_parameters_and_aliases() {
        assert_eq!(
            ContentType::new("IMAGE/PNG; charset=binary").unwrap().mime_type(),
            "image/png"
        );
        assert_eq!(ContentType::new("image/jpg").unwrap().mime_type(), "image/jpeg");
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        assert!(matches!(
            ContentType::new("application/pdf"),
            Err(AppError::UnsupportedMediaType(_))
        ));
        assert!(ContentType::new("").is_err());
    }

    #[test]
    fn test_heic_is_photo_without_thumbnail() {
        let heic = ContentType::new("image/heic").unwrap();
        assert_eq!(heic.category(), ContentCategory::Photo);
        assert!(!heic.supports_thumbnail());
    }
}
