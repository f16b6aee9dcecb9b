//! Filename validation and sanitisation.

use std::path::Path;

use crate::constants::MAX_FILENAME_LENGTH;
use crate::error::AppError;

/// Fail with `InvalidArgument` when a required string argument is empty or blank.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidArgument(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Reduce a client-supplied filename to a safe storage name.
///
/// Only the base name is kept; characters outside `[A-Za-z0-9._-]` become `_` and the
/// result is capped at 255 characters.
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "invalid_filename".to_string();
    }
    let s: String = base
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.trim().is_empty() || s.len() < 3 {
        "file".to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("IMG_0042.jpg"), "IMG_0042.jpg");
        assert_eq!(sanitize_filename("holiday-2024.mov"), "holiday-2024.mov");
    }

    #[test]
    fn test_sanitize_strips_directories_and_replaces_characters() {
        assert_eq!(sanitize_filename("/tmp/uploads/my photo.jpg"), "my_photo.jpg");
        assert_eq!(sanitize_filename("café.png"), "caf_.png");
    }

    #[test]
    fn test_sanitize_rejects_traversal_and_tiny_names() {
        assert_eq!(sanitize_filename(".."), "invalid_filename");
        assert_eq!(sanitize_filename("a"), "file");
        assert_eq!(sanitize_filename("   "), "file");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_filename(&long).len(), MAX_FILENAME_LENGTH);
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("fileName", "a.jpg").is_ok());
        assert!(matches!(
            require_non_empty("fileName", "  "),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
