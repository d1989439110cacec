//! Stable choice ids
//!
//! Choices without an explicit id get one derived from their position and
//! label, in the form `choice:{index}:{slug}`. Ids must be unique within one
//! resolver result so that focus/submit events can find their Choice again.

use std::collections::HashSet;

/// Generate an id for a choice that did not bring its own.
///
/// Format: choice:{index}:{slug}
pub fn generate_choice_id(index: usize, label: &str) -> String {
    format!("choice:{}:{}", index, value_to_slug(label))
}

/// Convert a label to a short slug.
///
/// - Lowercases
/// - Maps spaces, underscores and punctuation to single hyphens
/// - Truncates to 20 characters
/// - Falls back to "item" when nothing usable remains
pub fn value_to_slug(value: &str) -> String {
    let mut slug = String::with_capacity(20);
    let mut pending_hyphen = false;

    for c in value.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                if slug.len() >= 19 {
                    break;
                }
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }

        if slug.len() >= 20 {
            break;
        }
    }

    if slug.is_empty() {
        slug.push_str("item");
    }
    slug
}

/// Make `id` unique against `seen`, suffixing `-2`, `-3`, ... on collision.
/// The returned id is recorded in `seen`.
pub fn disambiguate(id: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(id.clone()) {
        return id;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", id, n);
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
