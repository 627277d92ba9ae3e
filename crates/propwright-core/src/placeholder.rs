//! Placeholder expansion in action text.
//!
//! Supported tokens:
//! - `{date}` - note creation date in the configured default format
//! - `{date:FORMAT}` - note creation date in FORMAT
//! - `{filename}` - note file name without extension
//!
//! Date formats use moment-style tokens (`YYYY-MM-DD`, `dddd, MMMM D`, ...),
//! the notation users already know from their note-taking app. Bracketed
//! text (`[week]`) is emitted literally.

use std::borrow::Cow;

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::types::DocumentContext;

/// Substituted for a date token that cannot be rendered.
pub const INVALID_DATE: &str = "Invalid date";

/// Default pattern for a bare `{date}`.
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";

lazy_static! {
    static ref PLACEHOLDER_PATTERN: Regex =
        Regex::new(r"\{(?:(filename)|date(?::([^{}]*))?)\}").unwrap();
}

/// moment token -> strftime, longest first so `MMMM` wins over `MM`.
const DATE_TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("DD", "%d"),
    ("D", "%-d"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("A", "%p"),
    ("a", "%P"),
];

/// Expands placeholders using per-note context.
#[derive(Debug, Clone)]
pub struct PlaceholderExpander {
    default_date_format: String,
}

impl PlaceholderExpander {
    pub fn new(default_date_format: impl Into<String>) -> Self {
        Self {
            default_date_format: default_date_format.into(),
        }
    }

    pub fn default_date_format(&self) -> &str {
        &self.default_date_format
    }

    /// Replace every placeholder in `text`. Literal text is left untouched
    /// and a failing date token degrades to [`INVALID_DATE`] on its own.
    pub fn expand<'t>(&self, text: &'t str, context: &DocumentContext) -> Cow<'t, str> {
        PLACEHOLDER_PATTERN.replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return context.basename.clone();
            }

            let format = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|f| !f.is_empty())
                .unwrap_or(self.default_date_format.as_str());

            match context.created {
                Some(created) => format_date(&created, format).unwrap_or_else(|| {
                    debug!(format = %format, "date placeholder could not be rendered");
                    INVALID_DATE.to_string()
                }),
                None => {
                    debug!(note = %context.basename, "no creation time for date placeholder");
                    INVALID_DATE.to_string()
                }
            }
        })
    }
}

impl Default for PlaceholderExpander {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

/// Render `date` with a moment-style format. `None` if the format is invalid.
pub fn format_date(date: &NaiveDateTime, format: &str) -> Option<String> {
    let strftime = to_strftime(format)?;
    let items: Vec<Item<'_>> = StrftimeItems::new(&strftime).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.into_iter()).to_string())
}

/// Translate moment tokens to a strftime string.
fn to_strftime(format: &str) -> Option<String> {
    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;

    'outer: while let Some(c) = rest.chars().next() {
        if c == '[' {
            // Literal section; an unclosed bracket is a malformed format
            let end = rest.find(']')?;
            out.push_str(&rest[1..end].replace('%', "%%"));
            rest = &rest[end + 1..];
            continue;
        }

        for (token, spec) in DATE_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }

        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }

    Some(out)
}
