//! URL slugs
//!
//! Slugs are lowercase ASCII alphanumerics separated by single hyphens.
//! Every other character counts as a separator.

use std::future::Future;

use super::ContentError;

/// Upper bound on `-2`, `-3`, ... suffixes tried for a generated slug
const MAX_SLUG_SUFFIX: u32 = 100;

/// Normalize free text into a slug.
///
/// Returns an empty string when the input has no ASCII alphanumerics.
pub fn generate_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            pending_separator = false;
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Whether a requested slug differs from the stored one once normalized
pub(crate) fn slug_changes(requested: &str, current: &str) -> bool {
    generate_slug(requested) != current
}

/// Pick the slug for a new or renamed record.
///
/// An explicit slug is normalized and must be free, otherwise
/// `DuplicateSlug`. Without one, the slug is derived from `fallback` and
/// numbered (`name-2`, `name-3`, ...) until `exists` reports it free.
pub(crate) async fn claim_slug<F, Fut>(
    explicit: Option<&str>,
    fallback: &str,
    exists: F,
) -> Result<String, ContentError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    if let Some(explicit) = explicit.filter(|s| !s.trim().is_empty()) {
        let slug = generate_slug(explicit);
        if slug.is_empty() {
            return Err(ContentError::Validation(format!(
                "slug '{}' has no usable characters",
                explicit
            )));
        }
        if exists(slug.clone()).await? {
            return Err(ContentError::DuplicateSlug(slug));
        }
        return Ok(slug);
    }

    let base = generate_slug(fallback);
    if base.is_empty() {
        return Err(ContentError::Validation(
            "slug cannot be derived from an empty name".to_string(),
        ));
    }
    if !exists(base.clone()).await? {
        return Ok(base);
    }
    for n in 2..=MAX_SLUG_SUFFIX {
        let candidate = format!("{}-{}", base, n);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }
    Err(ContentError::DuplicateSlug(base))
}
