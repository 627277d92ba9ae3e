//! Shared value types for the rule engine.
//!
//! A note's front matter is modelled as a [`MetadataStore`]: an ordered map
//! from property name to [`MetadataValue`]. Values are narrow:
//! a string, a list of strings, or an explicit null. Anything richer is
//! degraded to its string form by the reader before it reaches the engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Key present with no value (`tags:` in YAML)
    Null,

    /// Scalar value
    Text(String),

    /// Ordered list of values
    List(Vec<String>),
}

impl MetadataValue {
    /// Create a scalar value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Create a list value.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a value from items, collapsing a one-element list to a scalar.
    pub fn from_items(mut items: Vec<String>) -> Self {
        if items.len() == 1 {
            Self::Text(items.remove(0))
        } else {
            Self::List(items)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Property name to value. Keys are case-sensitive.
pub type MetadataStore = BTreeMap<String, MetadataValue>;

/// Changes to persist: `Some` sets a key, `None` deletes it.
pub type MetadataDiff = BTreeMap<String, Option<MetadataValue>>;

/// Compute the diff that turns `before` into `after`.
///
/// Unchanged keys are omitted, so an empty diff means nothing to write.
pub fn metadata_diff(before: &MetadataStore, after: &MetadataStore) -> MetadataDiff {
    let mut diff = MetadataDiff::new();

    for (key, value) in after {
        if before.get(key) != Some(value) {
            diff.insert(key.clone(), Some(value.clone()));
        }
    }

    for key in before.keys() {
        if !after.contains_key(key) {
            diff.insert(key.clone(), None);
        }
    }

    diff
}

/// Current state of one note, as supplied by a metadata reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentState {
    /// Front-matter snapshot (possibly empty)
    pub metadata: MetadataStore,

    /// First top-level heading, if any
    pub title: Option<String>,
}

impl DocumentState {
    pub fn new(metadata: MetadataStore, title: Option<String>) -> Self {
        Self { metadata, title }
    }
}

/// Per-note values available to placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContext {
    /// Creation time in local wall-clock time
    pub created: Option<NaiveDateTime>,

    /// File name without extension
    pub basename: String,
}

impl DocumentContext {
    pub fn new(basename: impl Into<String>, created: Option<NaiveDateTime>) -> Self {
        Self {
            basename: basename.into(),
            created,
        }
    }
}
