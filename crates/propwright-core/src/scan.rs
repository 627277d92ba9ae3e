//! Scan driver: selects notes, runs the rules, writes changes back.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::placeholder::PlaceholderExpander;
use crate::processor::{Evaluation, RuleSetProcessor};
use crate::rules::Rule;
use crate::settings::{ScanScope, Settings};
use crate::store::{
    DocumentRef, DocumentStore, MetadataReader, MetadataWriter, StoreError, TitleWriter,
};

/// A store failure for one note.
#[derive(Error, Debug)]
#[error("{id}: {source}")]
pub struct ScanError {
    pub id: String,
    #[source]
    pub source: StoreError,
}

impl ScanError {
    fn new(document: &DocumentRef, source: StoreError) -> Self {
        Self {
            id: document.id.clone(),
            source,
        }
    }
}

/// Serializable record of a note that failed during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub id: String,
    pub error: String,
}

impl From<ScanError> for ScanFailure {
    fn from(e: ScanError) -> Self {
        Self {
            error: e.source.to_string(),
            id: e.id,
        }
    }
}

/// Totals for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Notes read and evaluated
    pub scanned: usize,

    /// Notes with at least one change written back
    pub modified: usize,

    /// Notes that could not be read or written
    pub failed: Vec<ScanFailure>,
}

/// Result of processing a single note.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document: DocumentRef,
    pub evaluation: Evaluation,
}

impl DocumentOutcome {
    pub fn is_modified(&self) -> bool {
        self.evaluation.is_modified()
    }
}

/// Runs rule sets across a store.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    processor: RuleSetProcessor,
}

impl Scanner {
    pub fn new(processor: RuleSetProcessor) -> Self {
        Self { processor }
    }

    /// Scanner using the settings' default date format.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(RuleSetProcessor::new(PlaceholderExpander::new(
            settings.date_format.clone(),
        )))
    }

    /// Scan every note in `scope`.
    ///
    /// A failure to select notes aborts the scan. Failures on individual
    /// notes are logged, recorded in the summary, and the scan moves on.
    pub fn run<S>(
        &self,
        store: &S,
        rules: &[Rule],
        scope: &ScanScope,
    ) -> Result<ScanSummary, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let documents = store.select(scope)?;
        debug!(count = documents.len(), mode = ?scope.mode, "selected notes");

        let mut summary = ScanSummary::default();
        for document in &documents {
            match self.run_document(store, rules, document) {
                Ok(outcome) => {
                    summary.scanned += 1;
                    if outcome.is_modified() {
                        summary.modified += 1;
                    }
                }
                Err(e) => {
                    warn!(note = %e.id, error = %e.source, "failed to process note");
                    summary.failed.push(e.into());
                }
            }
        }

        info!(
            scanned = summary.scanned,
            modified = summary.modified,
            failed = summary.failed.len(),
            "scan complete"
        );
        Ok(summary)
    }

    /// Process one note and write back any changes.
    ///
    /// Metadata is written before the title. Both writes are attempted
    /// even if the first fails; the first error is returned.
    pub fn run_document<S>(
        &self,
        store: &S,
        rules: &[Rule],
        document: &DocumentRef,
    ) -> Result<DocumentOutcome, ScanError>
    where
        S: MetadataReader + MetadataWriter + TitleWriter + ?Sized,
    {
        let state = store
            .read(document)
            .map_err(|e| ScanError::new(document, e))?;
        let evaluation = self.processor.process(rules, &state, &document.context());

        if !evaluation.is_modified() {
            debug!(note = %document.id, "unchanged");
            return Ok(DocumentOutcome {
                document: document.clone(),
                evaluation,
            });
        }

        let mut first_error = None;

        if !evaluation.metadata_diff.is_empty() {
            if let Err(e) = store.write_metadata(document, &evaluation.metadata_diff) {
                first_error.get_or_insert(e);
            }
        }

        if let Some(title) = &evaluation.new_title {
            if let Err(e) = store.write_title(document, title) {
                if first_error.is_some() {
                    warn!(note = %document.id, error = %e, "title write also failed");
                }
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(ScanError::new(document, e));
        }

        info!(
            note = %document.id,
            keys = evaluation.metadata_diff.len(),
            title = evaluation.new_title.is_some(),
            "note updated"
        );
        Ok(DocumentOutcome {
            document: document.clone(),
            evaluation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Action, Operator, TitleModification};
    use crate::settings::ScanMode;
    use crate::types::{DocumentState, MetadataDiff, MetadataStore, MetadataValue};
    use crate::store::DocumentSelector;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};

    /// In-memory store keyed by id, in insertion order.
    #[derive(Default)]
    struct MemoryStore {
        order: Vec<DocumentRef>,
        notes: RefCell<BTreeMap<String, DocumentState>>,
        unreadable: BTreeSet<String>,
        fail_metadata: BTreeSet<String>,
        fail_title: BTreeSet<String>,
        title_writes: RefCell<usize>,
    }

    impl MemoryStore {
        fn insert(&mut self, id: &str, metadata: MetadataStore, title: Option<&str>) {
            self.order.push(DocumentRef::new(id, id));
            self.notes.borrow_mut().insert(
                id.to_string(),
                DocumentState::new(metadata, title.map(str::to_string)),
            );
        }

        fn state(&self, id: &str) -> DocumentState {
            self.notes.borrow()[id].clone()
        }
    }

    impl DocumentSelector for MemoryStore {
        fn select(&self, scope: &ScanScope) -> Result<Vec<DocumentRef>, StoreError> {
            let take = match scope.mode {
                ScanMode::EntireVault => self.order.len(),
                _ => scope.count,
            };
            Ok(self.order.iter().take(take).cloned().collect())
        }
    }

    impl MetadataReader for MemoryStore {
        fn read(&self, document: &DocumentRef) -> Result<DocumentState, StoreError> {
            if self.unreadable.contains(&document.id) {
                return Err(StoreError::Frontmatter("bad yaml".into()));
            }
            self.notes
                .borrow()
                .get(&document.id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(document.id.clone()))
        }
    }

    impl MetadataWriter for MemoryStore {
        fn write_metadata(
            &self,
            document: &DocumentRef,
            diff: &MetadataDiff,
        ) -> Result<(), StoreError> {
            if self.fail_metadata.contains(&document.id) {
                return Err(StoreError::Other("metadata write refused".into()));
            }
            let mut notes = self.notes.borrow_mut();
            let state = notes.get_mut(&document.id).unwrap();
            for (key, value) in diff {
                match value {
                    Some(v) => state.metadata.insert(key.clone(), v.clone()),
                    None => state.metadata.remove(key),
                };
            }
            Ok(())
        }
    }

    impl TitleWriter for MemoryStore {
        fn write_title(&self, document: &DocumentRef, title: &str) -> Result<(), StoreError> {
            *self.title_writes.borrow_mut() += 1;
            if self.fail_title.contains(&document.id) {
                return Err(StoreError::Other("title write refused".into()));
            }
            self.notes.borrow_mut().get_mut(&document.id).unwrap().title = Some(title.to_string());
            Ok(())
        }
    }

    fn meta(pairs: &[(&str, &str)]) -> MetadataStore {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), MetadataValue::text(*v)))
            .collect()
    }

    fn archive_rules() -> Vec<Rule> {
        vec![Rule::property("status", Operator::Exactly, "done")
            .then(Action::add("tags", "archived"))
            .then(Action::title(TitleModification::Prefix, "Done: "))]
    }

    #[test]
    fn test_scan_writes_matching_notes_only() {
        let mut store = MemoryStore::default();
        store.insert("a", meta(&[("status", "done")]), Some("Report"));
        store.insert("b", meta(&[("status", "draft")]), Some("Plan"));

        let summary = Scanner::default()
            .run(&store, &archive_rules(), &ScanScope::entire_vault())
            .unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.modified, 1);
        assert!(summary.failed.is_empty());

        let a = store.state("a");
        assert_eq!(a.metadata["tags"], MetadataValue::text("archived"));
        assert_eq!(a.title.as_deref(), Some("Done: Report"));
        assert_eq!(store.state("b").title.as_deref(), Some("Plan"));
    }

    #[test]
    fn test_second_scan_modifies_nothing() {
        let mut store = MemoryStore::default();
        store.insert("a", meta(&[("status", "done")]), Some("Report"));
        let scanner = Scanner::default();
        let rules = archive_rules();

        scanner.run(&store, &rules, &ScanScope::entire_vault()).unwrap();
        let again = scanner.run(&store, &rules, &ScanScope::entire_vault()).unwrap();
        assert_eq!(again.modified, 0);
        assert_eq!(*store.title_writes.borrow(), 1);
    }

    #[test]
    fn test_scope_limits_notes() {
        let mut store = MemoryStore::default();
        store.insert("a", meta(&[("status", "done")]), Some("A"));
        store.insert("b", meta(&[("status", "done")]), Some("B"));

        let summary = Scanner::default()
            .run(&store, &archive_rules(), &ScanScope::new(ScanMode::LatestCreated, 1))
            .unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(store.state("b").title.as_deref(), Some("B"));
    }

    #[test]
    fn test_read_failure_is_recorded_and_scan_continues() {
        let mut store = MemoryStore::default();
        store.insert("bad", meta(&[("status", "done")]), Some("X"));
        store.insert("good", meta(&[("status", "done")]), Some("Y"));
        store.unreadable.insert("bad".into());

        let summary = Scanner::default()
            .run(&store, &archive_rules(), &ScanScope::entire_vault())
            .unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].id, "bad");
    }

    #[test]
    fn test_title_still_written_when_metadata_write_fails() {
        let mut store = MemoryStore::default();
        store.insert("a", meta(&[("status", "done")]), Some("Report"));
        store.fail_metadata.insert("a".into());

        let doc = DocumentRef::new("a", "a");
        let err = Scanner::default()
            .run_document(&store, &archive_rules(), &doc)
            .unwrap_err();

        assert!(err.to_string().contains("metadata write refused"));
        assert_eq!(store.state("a").title.as_deref(), Some("Done: Report"));
    }

    #[test]
    fn test_first_error_reported_when_both_writes_fail() {
        let mut store = MemoryStore::default();
        store.insert("a", meta(&[("status", "done")]), Some("Report"));
        store.fail_metadata.insert("a".into());
        store.fail_title.insert("a".into());

        let doc = DocumentRef::new("a", "a");
        let err = Scanner::default()
            .run_document(&store, &archive_rules(), &doc)
            .unwrap_err();
        assert!(matches!(err.source, StoreError::Other(ref m) if m == "metadata write refused"));
    }

    #[test]
    fn test_run_document_uses_basename_placeholder() {
        let mut store = MemoryStore::default();
        store.insert("meeting", MetadataStore::new(), None);
        let rules = vec![Rule::heading(Operator::NotExists, "")
            .then(Action::title(TitleModification::Overwrite, "{filename}"))];

        let doc = DocumentRef::new("meeting", "meeting");
        let outcome = Scanner::default().run_document(&store, &rules, &doc).unwrap();
        assert!(outcome.is_modified());
        assert_eq!(store.state("meeting").title.as_deref(), Some("meeting"));
    }
}
