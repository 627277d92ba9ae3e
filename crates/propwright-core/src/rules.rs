//! Rule model.
//!
//! The serde shape here is the persisted wire format (current schema
//! version). Older shapes are handled by [`crate::migration`] before they
//! ever reach these types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// What a rule's IF clause looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IfKind {
    /// A front-matter property named by `ifProp`
    #[default]
    #[serde(rename = "PROPERTY")]
    Property,

    /// The note's first top-level heading
    #[serde(rename = "HEADING_FIRST_LEVEL")]
    FirstLevelHeading,
}

/// Comparison operator of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    #[default]
    Exactly,
    Contains,
    NotContains,
    Exists,
    NotExists,
    IsEmpty,
}

impl Operator {
    /// Operators that can still evaluate when the source is absent.
    pub fn accepts_absent_source(self) -> bool {
        matches!(self, Operator::NotExists | Operator::IsEmpty)
    }

    /// Whether `ifValue` participates in the comparison.
    pub fn uses_value(self) -> bool {
        matches!(
            self,
            Operator::Exactly | Operator::Contains | Operator::NotContains
        )
    }
}

/// How a property action mutates its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyActionKind {
    #[default]
    Add,
    Remove,
    Overwrite,
    Delete,
}

/// How a title action mutates the heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleModification {
    Prefix,
    Suffix,
    Overwrite,
}

/// Mutation of a single front-matter property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAction {
    /// Target property name
    #[serde(rename = "prop", default)]
    pub property: String,

    /// Comma-separated value(s); may contain placeholders
    #[serde(default)]
    pub value: String,

    #[serde(rename = "action", default)]
    pub kind: PropertyActionKind,
}

/// Mutation of the note's first-level heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleAction {
    pub modification: TitleModification,

    /// Text to apply; may contain placeholders
    #[serde(default)]
    pub text: String,
}

/// A single THEN action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Property(PropertyAction),
    Title(TitleAction),
}

impl Action {
    /// Add comma-separated values to a property.
    pub fn add(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::property(property, value, PropertyActionKind::Add)
    }

    /// Remove comma-separated values from a property.
    pub fn remove(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::property(property, value, PropertyActionKind::Remove)
    }

    /// Replace a property's value.
    pub fn overwrite(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::property(property, value, PropertyActionKind::Overwrite)
    }

    /// Delete a property (name matched case-insensitively).
    pub fn delete(property: impl Into<String>) -> Self {
        Self::property(property, "", PropertyActionKind::Delete)
    }

    pub fn title(modification: TitleModification, text: impl Into<String>) -> Self {
        Self::Title(TitleAction {
            modification,
            text: text.into(),
        })
    }

    fn property(
        property: impl Into<String>,
        value: impl Into<String>,
        kind: PropertyActionKind,
    ) -> Self {
        Self::Property(PropertyAction {
            property: property.into(),
            value: value.into(),
            kind,
        })
    }
}

/// Reasons a rule (or one of its actions) cannot run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleDefect {
    #[error("rule has no actions")]
    NoActions,

    #[error("property condition has no property name")]
    MissingIfProperty,

    #[error("action {0} has no property name")]
    MissingActionProperty(usize),
}

/// An IF/THEN rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(rename = "ifType", default)]
    pub if_kind: IfKind,

    /// Property to test; required when `if_kind` is `Property`
    #[serde(rename = "ifProp", default)]
    pub if_property: String,

    /// Value to compare against; ignored by Exists/NotExists/IsEmpty
    #[serde(default)]
    pub if_value: String,

    #[serde(rename = "op", default)]
    pub operator: Operator,

    /// Actions applied in order when the condition matches
    #[serde(default)]
    pub then_actions: Vec<Action>,
}

impl Rule {
    /// Start a rule that tests a property.
    pub fn property(
        if_property: impl Into<String>,
        operator: Operator,
        if_value: impl Into<String>,
    ) -> Self {
        Self {
            if_kind: IfKind::Property,
            if_property: if_property.into(),
            if_value: if_value.into(),
            operator,
            then_actions: Vec::new(),
        }
    }

    /// Start a rule that tests the first-level heading.
    pub fn heading(operator: Operator, if_value: impl Into<String>) -> Self {
        Self {
            if_kind: IfKind::FirstLevelHeading,
            if_property: String::new(),
            if_value: if_value.into(),
            operator,
            then_actions: Vec::new(),
        }
    }

    /// Append a THEN action.
    pub fn then(mut self, action: Action) -> Self {
        self.then_actions.push(action);
        self
    }

    /// First defect that makes the whole rule inert, if any.
    pub fn check(&self) -> Result<(), RuleDefect> {
        if self.then_actions.is_empty() {
            return Err(RuleDefect::NoActions);
        }
        if self.if_kind == IfKind::Property && self.if_property.trim().is_empty() {
            return Err(RuleDefect::MissingIfProperty);
        }
        Ok(())
    }

    /// `ifValue` when the operator never reads it.
    pub fn ignored_value(&self) -> Option<&str> {
        (!self.operator.uses_value() && !self.if_value.is_empty())
            .then_some(self.if_value.as_str())
    }

    /// Every defect, including per-action ones that only skip that action.
    pub fn defects(&self) -> Vec<RuleDefect> {
        let mut defects: Vec<RuleDefect> = self.check().err().into_iter().collect();

        // An empty rule is already reported as NoActions; the IF check still applies
        if defects == [RuleDefect::NoActions]
            && self.if_kind == IfKind::Property
            && self.if_property.trim().is_empty()
        {
            defects.push(RuleDefect::MissingIfProperty);
        }

        for (index, action) in self.then_actions.iter().enumerate() {
            if let Action::Property(p) = action {
                if p.property.trim().is_empty() {
                    defects.push(RuleDefect::MissingActionProperty(index));
                }
            }
        }

        defects
    }
}

/// Deserialize rules one by one, dropping any that do not fit the current
/// shape instead of failing the whole collection.
pub fn parse_rules(values: Vec<serde_json::Value>) -> Vec<Rule> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<Rule>(value) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(rule = index, error = %e, "dropping malformed rule");
                None
            }
        })
        .collect()
}
