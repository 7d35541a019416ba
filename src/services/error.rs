//! Error type shared by the content services

/// Error types for content (geography, listings, events, posts, media,
/// newsletters and subscriptions) operations
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced parent record (city, area, neighborhood, listing) does not exist
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Trimmed value of a required text field
pub(crate) fn required(field: &str, value: &str) -> Result<String, ContentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ContentError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(value.to_string())
}

/// Trimmed optional text, with blank strings treated as absent
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
