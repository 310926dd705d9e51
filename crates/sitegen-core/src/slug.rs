//! URL-safe identifiers derived from business names.
//!
//! Slugs name both the local artifact directory and the storage prefix, so
//! they are always non-empty, lowercase `[a-z0-9-]`, at most
//! [`MAX_SLUG_LEN`] characters and never start or end with a hyphen.

use slug::slugify;

pub const MAX_SLUG_LEN: usize = 50;
pub const FALLBACK_SLUG: &str = "site";

pub fn business_slug(name: &str) -> String {
    let mut candidate: String = slugify(name)
        .chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == '-')
        .collect();

    // slugify only emits ASCII, so byte truncation lands on a char boundary.
    candidate.truncate(MAX_SLUG_LEN);
    let trimmed = candidate.trim_matches('-');

    if trimmed.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// True when `value` could have been produced by [`business_slug`].
pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SLUG_LEN
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}
