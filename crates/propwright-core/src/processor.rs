//! Rule set processor: folds every rule over one note.
//!
//! For each rule, in order:
//!
//! 1. Skip it if it has no actions or no IF property (malformed)
//! 2. Resolve the IF source from the working copy (property or heading)
//! 3. Skip it if the heading is absent and the operator needs a value
//! 4. Evaluate the condition; skip on no match
//! 5. Fold every action into the working metadata and pending title
//!
//! Later rules, and later actions within a rule, see the effects of
//! earlier ones. The caller's snapshot is cloned up front and never
//! mutated; whether the note is "modified" is decided by comparing the
//! final working copy with that snapshot, so re-running the same rules
//! on the result yields no change.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::actions::{apply_property, apply_title};
use crate::condition::evaluate;
use crate::placeholder::PlaceholderExpander;
use crate::rules::{Action, IfKind, Rule, RuleDefect};
use crate::types::{
    metadata_diff, DocumentContext, DocumentState, MetadataDiff, MetadataStore, MetadataValue,
};

/// What happened to a single rule during processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleOutcome {
    /// Rule could not run (no actions, no IF property)
    Skipped { reason: String },

    /// Heading absent and the operator cannot evaluate an absent value
    Unresolvable,

    /// Condition evaluated to false
    NotMatched,

    /// Condition matched; `changed` counts actions that reported a change
    Applied { actions: usize, changed: usize },
}

/// Result of processing one note.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Final working copy of the metadata
    pub metadata: MetadataStore,

    /// Keys to write; empty when the metadata is unchanged
    pub metadata_diff: MetadataDiff,

    /// New title, when it differs from the note's current title
    pub new_title: Option<String>,

    /// Per-rule outcomes, in rule order
    pub outcomes: Vec<RuleOutcome>,
}

impl Evaluation {
    /// Whether anything needs to be written back.
    pub fn is_modified(&self) -> bool {
        !self.metadata_diff.is_empty() || self.new_title.is_some()
    }

    /// Number of rules whose condition matched.
    pub fn rules_matched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RuleOutcome::Applied { .. }))
            .count()
    }
}

/// Evaluates rule sets against notes.
///
/// Holds no per-note state, so one processor can serve any number of
/// notes, sequentially or from several threads.
#[derive(Debug, Clone, Default)]
pub struct RuleSetProcessor {
    expander: PlaceholderExpander,
}

/// Mutable state threaded through the rules of one note.
struct WorkingCopy {
    metadata: MetadataStore,
    title: Option<String>,
}

impl RuleSetProcessor {
    pub fn new(expander: PlaceholderExpander) -> Self {
        Self { expander }
    }

    /// Apply `rules` to one note and report the resulting changes.
    pub fn process(
        &self,
        rules: &[Rule],
        state: &DocumentState,
        context: &DocumentContext,
    ) -> Evaluation {
        let mut working = WorkingCopy {
            metadata: state.metadata.clone(),
            title: state.title.clone(),
        };

        let outcomes: Vec<RuleOutcome> = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let outcome = self.process_rule(rule, &mut working, context);
                trace!(rule = index, ?outcome, note = %context.basename, "rule processed");
                outcome
            })
            .collect();

        let metadata_diff = metadata_diff(&state.metadata, &working.metadata);
        let new_title = working.title.filter(|title| Some(title) != state.title.as_ref());

        Evaluation {
            metadata: working.metadata,
            metadata_diff,
            new_title,
            outcomes,
        }
    }

    fn process_rule(
        &self,
        rule: &Rule,
        working: &mut WorkingCopy,
        context: &DocumentContext,
    ) -> RuleOutcome {
        if let Err(defect) = rule.check() {
            if defect != RuleDefect::NoActions {
                debug!(%defect, "skipping malformed rule");
            }
            return RuleOutcome::Skipped {
                reason: defect.to_string(),
            };
        }

        let heading;
        let source = match rule.if_kind {
            IfKind::FirstLevelHeading => {
                if working.title.is_none() && !rule.operator.accepts_absent_source() {
                    debug!(note = %context.basename, "no title available, rule skipped");
                    return RuleOutcome::Unresolvable;
                }
                heading = working.title.clone().map(MetadataValue::Text);
                heading.as_ref()
            }
            IfKind::Property => working.metadata.get(&rule.if_property),
        };

        if !evaluate(source, &rule.if_value, rule.operator, rule.if_kind) {
            return RuleOutcome::NotMatched;
        }

        let mut changed = 0;
        for (index, action) in rule.then_actions.iter().enumerate() {
            if self.apply_action(action, working, context) {
                changed += 1;
            } else {
                trace!(action = index, "action left note unchanged");
            }
        }

        RuleOutcome::Applied {
            actions: rule.then_actions.len(),
            changed,
        }
    }

    fn apply_action(
        &self,
        action: &Action,
        working: &mut WorkingCopy,
        context: &DocumentContext,
    ) -> bool {
        match action {
            Action::Property(property) => {
                if property.property.trim().is_empty() {
                    debug!("skipping property action with no property name");
                    return false;
                }
                let value = self.expander.expand(&property.value, context);
                apply_property(&mut working.metadata, property, &value)
            }
            Action::Title(title) => {
                let text = self.expander.expand(&title.text, context);
                match apply_title(working.title.as_deref(), title, &text) {
                    Some(next) => {
                        working.title = Some(next);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Operator, TitleModification};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn context() -> DocumentContext {
        let created = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        DocumentContext::new("Inbox note", Some(created))
    }

    fn state(pairs: &[(&str, MetadataValue)], title: Option<&str>) -> DocumentState {
        DocumentState::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            title.map(str::to_string),
        )
    }

    /// Apply the evaluation's changes the way a writer would.
    fn write_back(state: &DocumentState, evaluation: &Evaluation) -> DocumentState {
        DocumentState::new(
            evaluation.metadata.clone(),
            evaluation.new_title.clone().or_else(|| state.title.clone()),
        )
    }

    #[test]
    fn test_rule_without_actions_is_inert() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("status", Operator::Exists, "")];
        let result = processor.process(&rules, &state(&[("status", "x".into())], None), &context());

        assert!(!result.is_modified());
        assert!(matches!(result.outcomes[0], RuleOutcome::Skipped { .. }));
    }

    #[test]
    fn test_property_rule_without_if_property_is_skipped() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("", Operator::NotExists, "").then(Action::add("a", "b"))];
        let result = processor.process(&rules, &DocumentState::default(), &context());

        assert!(!result.is_modified());
    }

    #[test]
    fn test_matching_rule_applies_actions() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("status", Operator::Exactly, "done")
            .then(Action::add("tags", "archived"))
            .then(Action::delete("due"))];
        let doc = state(
            &[
                ("status", "[[done]]".into()),
                ("due", "2024-06-30".into()),
                ("tags", "work".into()),
            ],
            None,
        );

        let result = processor.process(&rules, &doc, &context());
        assert!(result.is_modified());
        assert_eq!(
            result.metadata_diff["tags"],
            Some(MetadataValue::list(["work", "archived"]))
        );
        assert_eq!(result.metadata_diff["due"], None);
        assert_eq!(result.rules_matched(), 1);
    }

    #[test]
    fn test_non_matching_rule_changes_nothing() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("status", Operator::Exactly, "done")
            .then(Action::overwrite("tags", "x"))];
        let doc = state(&[("status", "open".into())], None);
        let result = processor.process(&rules, &doc, &context());

        assert!(!result.is_modified());
        assert_eq!(result.outcomes, vec![RuleOutcome::NotMatched]);
    }

    #[test]
    fn test_snapshot_is_not_mutated() {
        let processor = RuleSetProcessor::default();
        let doc = state(&[("tags", "a".into())], Some("Title"));
        let before = doc.clone();
        let rules = vec![Rule::property("tags", Operator::Exists, "")
            .then(Action::add("tags", "b"))
            .then(Action::title(TitleModification::Suffix, "!"))];

        let result = processor.process(&rules, &doc, &context());
        assert!(result.is_modified());
        assert_eq!(doc, before);
    }

    #[test]
    fn test_overwrite_to_same_value_is_unmodified() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("status", Operator::Exists, "")
            .then(Action::overwrite("status", "done"))];
        let doc = state(&[("status", "done".into())], None);
        let result = processor.process(&rules, &doc, &context());

        assert!(!result.is_modified());
        assert_eq!(
            result.outcomes,
            vec![RuleOutcome::Applied { actions: 1, changed: 1 }]
        );
    }

    #[test]
    fn test_self_targeting_rule_sees_its_own_changes() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("tags", Operator::Contains, "inbox")
            .then(Action::remove("tags", "inbox"))
            .then(Action::add("tags", "processed"))];
        let doc = state(&[("tags", MetadataValue::list(["inbox", "idea"]))], None);

        let result = processor.process(&rules, &doc, &context());
        assert_eq!(
            result.metadata["tags"],
            MetadataValue::list(["idea", "processed"])
        );
    }

    #[test]
    fn test_later_rules_see_earlier_changes() {
        let processor = RuleSetProcessor::default();
        let rules = vec![
            Rule::property("status", Operator::Exactly, "done")
                .then(Action::overwrite("stage", "archive")),
            Rule::property("stage", Operator::Exactly, "archive")
                .then(Action::add("tags", "archived")),
        ];
        let doc = state(&[("status", "done".into())], None);
        let result = processor.process(&rules, &doc, &context());

        assert_eq!(result.metadata["tags"], MetadataValue::text("archived"));
    }

    #[test]
    fn test_placeholders_expand_in_values() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::property("created", Operator::NotExists, "")
            .then(Action::overwrite("created", "{date}"))
            .then(Action::add("related", "[[{filename}]]"))];
        let result = processor.process(&rules, &DocumentState::default(), &context());

        assert_eq!(result.metadata["created"], MetadataValue::text("2024-06-01"));
        assert_eq!(result.metadata["related"], MetadataValue::text("[[Inbox note]]"));
    }

    #[test]
    fn test_missing_heading_skips_value_operators() {
        let processor = RuleSetProcessor::default();
        let rules = vec![
            Rule::heading(Operator::NotContains, "Draft")
                .then(Action::add("reviewed", "yes")),
            Rule::heading(Operator::Exists, "")
                .then(Action::add("titled", "yes")),
        ];
        let result = processor.process(&rules, &DocumentState::default(), &context());

        assert!(!result.is_modified());
        assert_eq!(
            result.outcomes,
            vec![RuleOutcome::Unresolvable, RuleOutcome::Unresolvable]
        );
    }

    #[test]
    fn test_missing_heading_is_empty() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::heading(Operator::IsEmpty, "").then(Action::add("todo", "title"))];
        let result = processor.process(&rules, &DocumentState::default(), &context());

        assert_eq!(result.metadata["todo"], MetadataValue::text("title"));
    }

    #[test]
    fn test_untitled_end_to_end() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::heading(Operator::NotExists, "")
            .then(Action::title(TitleModification::Overwrite, "Untitled"))];
        let doc = DocumentState::default();

        let first = processor.process(&rules, &doc, &context());
        assert_eq!(first.new_title.as_deref(), Some("Untitled"));
        assert!(first.metadata_diff.is_empty());

        let second = processor.process(&rules, &write_back(&doc, &first), &context());
        assert!(!second.is_modified());
        assert_eq!(second.outcomes, vec![RuleOutcome::NotMatched]);
    }

    #[test]
    fn test_last_title_action_wins() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::heading(Operator::Contains, "Report")
            .then(Action::title(TitleModification::Overwrite, "Q1 Report"))
            .then(Action::title(TitleModification::Suffix, " (final)"))];
        let result = processor.process(&rules, &state(&[], Some("Report")), &context());

        assert_eq!(result.new_title.as_deref(), Some("Q1 Report (final)"));
    }

    #[test]
    fn test_title_returning_to_original_is_unmodified() {
        let processor = RuleSetProcessor::default();
        let rules = vec![Rule::heading(Operator::Exists, "")
            .then(Action::title(TitleModification::Overwrite, "Other"))
            .then(Action::title(TitleModification::Overwrite, "Same"))];
        let result = processor.process(&rules, &state(&[], Some("Same")), &context());

        assert!(!result.is_modified());
    }

    #[test]
    fn test_heading_rule_sees_pending_title() {
        let processor = RuleSetProcessor::default();
        let rules = vec![
            Rule::heading(Operator::NotExists, "")
                .then(Action::title(TitleModification::Overwrite, "Untitled")),
            Rule::heading(Operator::Exactly, "Untitled")
                .then(Action::add("tags", "needs-title")),
        ];
        let result = processor.process(&rules, &DocumentState::default(), &context());

        assert_eq!(result.metadata["tags"], MetadataValue::text("needs-title"));
    }

    fn arb_title_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            " ?[xyz]{1,2} ?".prop_map(|t| Action::title(TitleModification::Prefix, t)),
            " ?[xyz]{1,2} ?".prop_map(|t| Action::title(TitleModification::Suffix, t)),
            "[ xyz]{0,3}".prop_map(|t| Action::title(TitleModification::Overwrite, t)),
        ]
    }

    proptest! {
        #[test]
        fn prop_second_pass_is_unmodified(
            value in "[xyz]{1,3}",
            title in proptest::option::of("[xyz]{1,4}"),
            adds in proptest::collection::vec(("[ab]", "[xyz, ]{1,5}"), 1..4),
            title_action in proptest::option::of(arb_title_action()),
            overwrite in "[xyz]{0,3}",
        ) {
            let mut rule = Rule::property("a", Operator::Exists, "");
            for (property, values) in adds {
                rule = rule.then(Action::add(property, values));
            }
            if let Some(action) = title_action {
                rule = rule.then(action);
            }
            let rules = vec![
                rule,
                Rule::heading(Operator::IsEmpty, "").then(Action::overwrite("c", overwrite)),
            ];

            let processor = RuleSetProcessor::default();
            let doc = state(&[("a", MetadataValue::text(value))], title.as_deref());
            let first = processor.process(&rules, &doc, &context());
            let second = processor.process(&rules, &write_back(&doc, &first), &context());
            prop_assert!(!second.is_modified(), "second pass changed {:?}", second.metadata_diff);
        }
    }
}
