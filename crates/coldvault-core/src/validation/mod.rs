//! Validation modules

pub mod filename;
pub mod tags;

pub use filename::{require_non_empty, sanitize_filename};
pub use tags::{validate_description, validate_tags, MAX_DESCRIPTION_LENGTH, MAX_TAGS, MAX_TAG_LENGTH};
