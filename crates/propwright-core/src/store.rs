//! Collaborator traits for note storage.
//!
//! The engine never touches the filesystem itself. A host supplies these
//! four capabilities and the [`crate::scan::Scanner`] drives them.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::settings::ScanScope;
use crate::types::{DocumentContext, DocumentState, MetadataDiff};

/// Errors from a note store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid front matter: {0}")]
    Frontmatter(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Other(String),
}

/// Identity and timestamps of one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Store-specific identifier (a vault-relative path for file stores)
    pub id: String,

    /// File name without extension
    pub basename: String,

    /// Creation time, local wall-clock
    pub created: Option<NaiveDateTime>,

    /// Last modification time, local wall-clock
    pub modified: Option<NaiveDateTime>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, basename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            basename: basename.into(),
            created: None,
            modified: None,
        }
    }

    pub fn with_times(
        mut self,
        created: Option<NaiveDateTime>,
        modified: Option<NaiveDateTime>,
    ) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    /// Placeholder context for this note.
    pub fn context(&self) -> DocumentContext {
        DocumentContext::new(self.basename.clone(), self.created)
    }
}

/// Picks the notes a scan visits.
pub trait DocumentSelector {
    /// Notes in scope, in the order they should be processed.
    ///
    /// For the latest-N modes, implementations sort by the relevant
    /// timestamp (newest first) and keep the first `scope.count`.
    fn select(&self, scope: &ScanScope) -> Result<Vec<DocumentRef>, StoreError>;
}

/// Reads the current metadata and title of a note.
pub trait MetadataReader {
    fn read(&self, document: &DocumentRef) -> Result<DocumentState, StoreError>;
}

/// Persists metadata changes.
pub trait MetadataWriter {
    /// Apply `diff` to the note's front matter. `None` entries delete the
    /// key; keys not named in the diff must be left untouched.
    fn write_metadata(&self, document: &DocumentRef, diff: &MetadataDiff) -> Result<(), StoreError>;
}

/// Persists a new first-level heading.
pub trait TitleWriter {
    fn write_title(&self, document: &DocumentRef, title: &str) -> Result<(), StoreError>;
}

/// Everything a scan needs from a store.
pub trait DocumentStore: DocumentSelector + MetadataReader + MetadataWriter + TitleWriter {}

impl<T> DocumentStore for T where
    T: DocumentSelector + MetadataReader + MetadataWriter + TitleWriter
{
}
