//! Tag and description validation for file metadata.

use crate::error::AppError;

/// Maximum number of tags on one file
pub const MAX_TAGS: usize = 50;

/// Maximum length of a single tag
pub const MAX_TAG_LENGTH: usize = 64;

pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Validate a tag list: at most 50 tags, each non-empty and at most 64 characters.
pub fn validate_tags(tags: &[String]) -> Result<(), AppError> {
    if tags.len() > MAX_TAGS {
        return Err(AppError::InvalidArgument(format!(
            "At most {} tags are allowed, got {}",
            MAX_TAGS,
            tags.len()
        )));
    }
    for tag in tags {
        if tag.trim().is_empty() {
            return Err(AppError::InvalidArgument("Tags cannot be empty".to_string()));
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(AppError::InvalidArgument(format!(
                "Tag '{}' exceeds maximum length of {} characters",
                tag, MAX_TAG_LENGTH
            )));
        }
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), AppError> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(AppError::InvalidArgument(format!(
            "Description exceeds maximum length of {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tags() {
        assert!(validate_tags(&["beach".to_string(), "2024".to_string()]).is_ok());
        assert!(validate_tags(&[" ".to_string()]).is_err());
        assert!(validate_tags(&["x".repeat(MAX_TAG_LENGTH + 1)]).is_err());

        let too_many: Vec<String> = (0..=MAX_TAGS).map(|i| format!("tag{}", i)).collect();
        assert!(validate_tags(&too_many).is_err());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("Sunset at the pier").is_ok());
        assert!(validate_description(&"d".repeat(MAX_DESCRIPTION_LENGTH + 1)).is_err());
    }
}
