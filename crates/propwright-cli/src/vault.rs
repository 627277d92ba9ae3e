//! Filesystem-backed note store.

use std::cmp::Reverse;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use propwright_core::{
    DocumentRef, DocumentSelector, DocumentState, MetadataDiff, MetadataReader, MetadataWriter,
    ScanMode, ScanScope, StoreError, TitleWriter,
};
use tracing::{debug, info, warn};

use crate::frontmatter::{apply_metadata_diff, set_heading, Note};

/// A directory of markdown notes.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    use_inline_title: bool,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_inline_title: false,
        }
    }

    /// Fall back to the file name when a note has no heading.
    pub fn with_inline_title(mut self, enabled: bool) -> Self {
        self.use_inline_title = enabled;
        self
    }

    /// Build a reference for one note, relative to the vault root or not.
    pub fn document(&self, path: &Path) -> Result<DocumentRef, StoreError> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let metadata = fs::metadata(&full).map_err(|e| not_found(e, &full))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(full.display().to_string()));
        }

        let id = full
            .strip_prefix(&self.root)
            .unwrap_or(&full)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let basename = full
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DocumentRef::new(id, basename).with_times(
            local_time(metadata.created()),
            local_time(metadata.modified()),
        ))
    }

    /// References for `paths`. A note that cannot be inspected is logged
    /// and left out rather than failing the whole selection.
    fn documents(&self, paths: &[PathBuf]) -> Vec<DocumentRef> {
        paths
            .iter()
            .filter_map(|path| match self.document(path) {
                Ok(document) => Some(document),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping note");
                    None
                }
            })
            .collect()
    }

    fn path(&self, document: &DocumentRef) -> PathBuf {
        let relative = Path::new(&document.id);
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }

    fn read_content(&self, document: &DocumentRef) -> Result<String, StoreError> {
        let path = self.path(document);
        fs::read_to_string(&path).map_err(|e| not_found(e, &path))
    }
}

impl DocumentSelector for FsVault {
    fn select(&self, scope: &ScanScope) -> Result<Vec<DocumentRef>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::NotFound(self.root.display().to_string()));
        }

        let mut documents = self.documents(&collect_md_files(&self.root));

        match scope.mode {
            ScanMode::LatestCreated => {
                documents.sort_by_key(|d| Reverse(d.created.or(d.modified)));
                documents.truncate(scope.count);
            }
            ScanMode::LatestModified => {
                documents.sort_by_key(|d| Reverse(d.modified));
                documents.truncate(scope.count);
            }
            ScanMode::EntireVault => documents.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        debug!(root = %self.root.display(), count = documents.len(), "collected notes");
        Ok(documents)
    }
}

impl MetadataReader for FsVault {
    fn read(&self, document: &DocumentRef) -> Result<DocumentState, StoreError> {
        let content = self.read_content(document)?;
        let note = Note::parse(&content);

        let title = note
            .first_heading()
            .or_else(|| self.use_inline_title.then(|| document.basename.clone()));

        Ok(DocumentState::new(note.metadata()?, title))
    }
}

impl MetadataWriter for FsVault {
    fn write_metadata(
        &self,
        document: &DocumentRef,
        diff: &MetadataDiff,
    ) -> Result<(), StoreError> {
        let content = self.read_content(document)?;
        let updated = apply_metadata_diff(&content, diff)?;
        fs::write(self.path(document), updated)?;
        Ok(())
    }
}

impl TitleWriter for FsVault {
    fn write_title(&self, document: &DocumentRef, title: &str) -> Result<(), StoreError> {
        let content = self.read_content(document)?;
        fs::write(self.path(document), set_heading(&content, title))?;
        Ok(())
    }
}

/// Wraps a store and logs writes instead of performing them.
#[derive(Debug, Clone)]
pub struct DryRun<S> {
    inner: S,
}

impl<S> DryRun<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: DocumentSelector> DocumentSelector for DryRun<S> {
    fn select(&self, scope: &ScanScope) -> Result<Vec<DocumentRef>, StoreError> {
        self.inner.select(scope)
    }
}

impl<S: MetadataReader> MetadataReader for DryRun<S> {
    fn read(&self, document: &DocumentRef) -> Result<DocumentState, StoreError> {
        self.inner.read(document)
    }
}

impl<S> MetadataWriter for DryRun<S> {
    fn write_metadata(
        &self,
        document: &DocumentRef,
        diff: &MetadataDiff,
    ) -> Result<(), StoreError> {
        for (key, value) in diff {
            match value {
                Some(value) => info!(note = %document.id, key = %key, value = %value, "would set"),
                None => info!(note = %document.id, key = %key, "would delete"),
            }
        }
        Ok(())
    }
}

impl<S> TitleWriter for DryRun<S> {
    fn write_title(&self, document: &DocumentRef, title: &str) -> Result<(), StoreError> {
        info!(note = %document.id, title, "would retitle");
        Ok(())
    }
}

/// Collect all .md files under `root`, skipping hidden dirs and files.
fn collect_md_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable vault entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("md"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn local_time(time: io::Result<SystemTime>) -> Option<NaiveDateTime> {
    time.ok()
        .map(|t| DateTime::<Local>::from(t).naive_local())
}

fn not_found(e: io::Error, path: &Path) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(path.display().to_string())
    } else {
        StoreError::Io(e)
    }
}
