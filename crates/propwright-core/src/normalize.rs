//! Value normalization for comparisons.
//!
//! Front matter written by hand is inconsistent: the same value may appear
//! as `project`, `"project"` or `[[project]]`. Every comparison the engine
//! makes goes through [`normalize`] so these all compare equal.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::MetadataValue;

lazy_static! {
    /// Wiki-link decoration `[[target]]` (non-nested)
    static ref WIKI_LINK_PATTERN: Regex = Regex::new(r"\[\[([^\]]+)\]\]").unwrap();
}

/// Canonicalize a raw string for comparison.
///
/// Strips one layer of wrapping double quotes, unwraps every `[[link]]`,
/// then trims surrounding whitespace. Total: never fails.
pub fn normalize(raw: &str) -> String {
    let unquoted = if raw.len() > 1 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };

    WIKI_LINK_PATTERN
        .replace_all(unquoted, "$1")
        .trim()
        .to_string()
}

/// Normalize an optional scalar. Absent and null values normalize to `""`.
///
/// Lists are rendered comma-joined; callers that need per-element
/// semantics should iterate the list themselves.
pub fn normalize_value(value: Option<&MetadataValue>) -> String {
    match value {
        None | Some(MetadataValue::Null) => String::new(),
        Some(MetadataValue::Text(s)) => normalize(s),
        Some(MetadataValue::List(items)) => normalize(&items.join(", ")),
    }
}

/// Membership equality used by Add and Remove.
pub fn values_equal(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
