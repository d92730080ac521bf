//! Title normalization helpers
//!
//! Cache identities use [`normalize_title`]; vector-store ids use
//! [`to_ascii_safe_id`], which must stay deterministic across processes
//! because ids are shared with the external vector index.

use crate::models::ContentType;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, whitespace-trimmed title used as the cache identity
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// ASCII-safe slug for a title
///
/// NFKD-normalizes, drops non-ASCII characters, collapses runs of
/// non-alphanumerics into `_` and lowercases. Titles with no ASCII
/// alphanumerics at all fall back to the first 8 hex digits of their MD5.
pub fn to_ascii_safe_id(name: &str) -> String {
    let ascii: String = name.nfkd().filter(|c| c.is_ascii()).collect();

    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        let digest = md5::compute(name.as_bytes());
        return format!("{:x}", digest)[..8].to_string();
    }

    slug
}

/// Vector-store id for a title: `"{content_type}_{slug}"`
pub fn vector_id(content_type: ContentType, title: &str) -> String {
    format!("{}_{}", content_type, to_ascii_safe_id(title))
}

/// Whether a resolved title diverges enough from the query to need an alias
///
/// Compares characters position by position (case-insensitive) over the
/// shorter string's length. Diverges when fewer than half of them match.
pub fn titles_diverge(query: &str, canonical: &str) -> bool {
    let query: Vec<char> = query.trim().to_lowercase().chars().collect();
    let canonical: Vec<char> = canonical.trim().to_lowercase().chars().collect();

    let shorter = query.len().min(canonical.len());
    if shorter == 0 {
        return false;
    }

    let matches = query
        .iter()
        .zip(canonical.iter())
        .filter(|(a, b)| a == b)
        .count();

    matches * 2 < shorter
}
