//! # propwright-core
//!
//! Conditional rule engine for note metadata and titles.
//!
//! A rule says: IF a front-matter property (or the note's first-level
//! heading) satisfies a condition, THEN apply a list of actions that add,
//! remove, overwrite or delete properties, or prefix, suffix or overwrite
//! the heading.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same rules and note always produce the same changes
//! 2. **Idempotent**: Re-running rules on their own output changes nothing
//! 3. **Storage-agnostic**: Notes are reached only through [`store`] traits
//! 4. **Forward-compatible**: Older settings records are migrated on load
//!
//! ## Example
//!
//! ```rust,ignore
//! use propwright_core::{process_document, Action, Operator, Rule};
//!
//! let rules = vec![Rule::property("status", Operator::Exactly, "done")
//!     .then(Action::add("tags", "archived"))];
//! let evaluation = process_document(&rules, &state, &context);
//!
//! if evaluation.is_modified() {
//!     writer.write_metadata(&doc, &evaluation.metadata_diff)?;
//! }
//! ```

pub mod actions;
pub mod condition;
pub mod migration;
pub mod normalize;
pub mod placeholder;
pub mod processor;
pub mod rules;
pub mod scan;
pub mod settings;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use migration::{migrate, MigrationError, MigrationReport, CURRENT_SCHEMA_VERSION};
pub use placeholder::PlaceholderExpander;
pub use processor::{Evaluation, RuleOutcome, RuleSetProcessor};
pub use rules::{
    parse_rules, Action, IfKind, Operator, PropertyAction, PropertyActionKind, Rule, RuleDefect,
    TitleAction, TitleModification,
};
pub use scan::{DocumentOutcome, ScanError, ScanFailure, ScanSummary, Scanner};
pub use settings::{ScanMode, ScanScope, Settings, SettingsError};
pub use store::{
    DocumentRef, DocumentSelector, DocumentStore, MetadataReader, MetadataWriter, StoreError,
    TitleWriter,
};
pub use types::{
    DocumentContext, DocumentState, MetadataDiff, MetadataStore, MetadataValue,
};

/// Apply `rules` to one note with the default date format.
///
/// Convenience over [`RuleSetProcessor::process`] for callers that do not
/// configure placeholders.
pub fn process_document(
    rules: &[Rule],
    state: &DocumentState,
    context: &DocumentContext,
) -> Evaluation {
    RuleSetProcessor::default().process(rules, state, context)
}
