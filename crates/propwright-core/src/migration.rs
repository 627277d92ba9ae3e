//! Versioned migration of the persisted settings record.
//!
//! Migration works on the raw JSON record, before it is typed, because
//! legacy rule shapes do not deserialize into [`crate::Rule`]. Each step
//! carries a version gate and runs only when the stored `schemaVersion` is
//! below it. After all steps the version is set to
//! [`CURRENT_SCHEMA_VERSION`], whatever happened to individual rules.
//!
//! | version | shape |
//! |---|---|
//! | 0 | single action (`thenProp`/`thenValue`), `ifType: TITLE`, untagged actions, `op: contains` meaning equality |
//! | 1 | `thenActions` lists, `HEADING_FIRST_LEVEL`, tagged actions |
//! | 2 | six-operator enum (`exactly`, `contains`, ...) |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Schema version written by this release.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const SCHEMA_VERSION_KEY: &str = "schemaVersion";
const RULES_KEY: &str = "rules";

/// Why a single legacy rule could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("settings record is not an object")]
    NotAnObject,

    #[error("rule is not an object")]
    RuleNotAnObject,

    #[error("field `{0}` has an unexpected type")]
    Malformed(&'static str),

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("action {0} is not an object")]
    ActionNotAnObject(usize),
}

/// A rule removed because no step could interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRule {
    /// Position in the collection as loaded
    pub index: usize,
    pub reason: String,
}

/// Summary of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Rules rewritten by at least one step
    pub rules_changed: usize,
    pub dropped: Vec<DroppedRule>,
}

impl MigrationReport {
    /// Whether the record must be persisted again.
    pub fn advanced(&self) -> bool {
        self.from_version < self.to_version
    }
}

type StepFn = fn(&mut Map<String, Value>) -> Result<bool, MigrationError>;

/// A single gated migration step.
struct Step {
    /// Version the record has after this step
    target: u32,
    name: &'static str,
    apply: StepFn,
}

const STEPS: &[Step] = &[
    Step {
        target: 1,
        name: "action lists",
        apply: reshape_rule,
    },
    Step {
        target: 2,
        name: "operator enum",
        apply: remap_operator,
    },
];

/// Bring a raw settings record up to [`CURRENT_SCHEMA_VERSION`].
///
/// Pure: takes the old record, returns the new one. A record already at
/// (or beyond) the current version is returned unchanged.
pub fn migrate(record: Value) -> Result<(Value, MigrationReport), MigrationError> {
    let Value::Object(mut record) = record else {
        return Err(MigrationError::NotAnObject);
    };

    let from_version = stored_version(&record);
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        ..Default::default()
    };

    if from_version >= CURRENT_SCHEMA_VERSION {
        debug!(version = from_version, "settings already current");
        return Ok((Value::Object(record), report));
    }

    let rules = match record.remove(RULES_KEY) {
        Some(Value::Array(rules)) => rules,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            warn!("`rules` is not a list; starting with no rules");
            Vec::new()
        }
    };

    let steps: Vec<&Step> = STEPS.iter().filter(|s| s.target > from_version).collect();
    let mut migrated = Vec::with_capacity(rules.len());

    for (index, rule) in rules.into_iter().enumerate() {
        match migrate_rule(rule, &steps) {
            Ok((rule, changed)) => {
                if changed {
                    report.rules_changed += 1;
                }
                migrated.push(rule);
            }
            Err(e) => {
                warn!(rule = index, error = %e, "dropping rule that cannot be migrated");
                report.dropped.push(DroppedRule {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    record.insert(RULES_KEY.to_string(), Value::Array(migrated));
    record.insert(
        SCHEMA_VERSION_KEY.to_string(),
        Value::from(CURRENT_SCHEMA_VERSION),
    );
    report.to_version = CURRENT_SCHEMA_VERSION;

    info!(
        from = report.from_version,
        to = report.to_version,
        changed = report.rules_changed,
        dropped = report.dropped.len(),
        "settings migrated"
    );
    Ok((Value::Object(record), report))
}

fn stored_version(record: &Map<String, Value>) -> u32 {
    record
        .get(SCHEMA_VERSION_KEY)
        .and_then(Value::as_u64)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn migrate_rule(rule: Value, steps: &[&Step]) -> Result<(Value, bool), MigrationError> {
    let Value::Object(mut rule) = rule else {
        return Err(MigrationError::RuleNotAnObject);
    };

    let mut changed = false;
    for step in steps {
        if (step.apply)(&mut rule)? {
            debug!(step = step.name, "rule rewritten");
            changed = true;
        }
    }
    Ok((Value::Object(rule), changed))
}

/// Read a scalar field as text. Numbers and booleans degrade to their
/// string form; null and absent become `None`.
fn text_field(
    rule: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, MigrationError> {
    match rule.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(MigrationError::Malformed(key)),
    }
}

/// 0 -> 1: single-action rules, title tag, untagged actions.
fn reshape_rule(rule: &mut Map<String, Value>) -> Result<bool, MigrationError> {
    if rule.contains_key("thenProp") || rule.contains_key("thenValue") {
        let then_prop = text_field(rule, "thenProp")?.unwrap_or_default();
        let then_value = text_field(rule, "thenValue")?.unwrap_or_default();

        let mut actions = Vec::new();
        if !then_prop.is_empty() {
            actions.push(serde_json::json!({
                "type": "property",
                "prop": then_prop,
                "value": then_value,
                "action": "add",
            }));
        }

        let mut reshaped = Map::new();
        reshaped.insert("ifType".into(), Value::from("PROPERTY"));
        reshaped.insert(
            "ifProp".into(),
            Value::from(text_field(rule, "ifProp")?.unwrap_or_default()),
        );
        reshaped.insert(
            "ifValue".into(),
            Value::from(text_field(rule, "ifValue")?.unwrap_or_default()),
        );
        if let Some(op) = rule.get("op") {
            reshaped.insert("op".into(), op.clone());
        }
        reshaped.insert("thenActions".into(), Value::Array(actions));

        *rule = reshaped;
        return Ok(true);
    }

    let mut changed = false;

    match rule.get("ifType") {
        None | Some(Value::Null) => {
            rule.insert("ifType".into(), Value::from("PROPERTY"));
            changed = true;
        }
        Some(Value::String(kind)) if kind == "TITLE" => {
            rule.insert("ifType".into(), Value::from("HEADING_FIRST_LEVEL"));
            changed = true;
        }
        Some(Value::String(_)) => {}
        Some(_) => return Err(MigrationError::Malformed("ifType")),
    }

    for key in ["ifProp", "ifValue"] {
        if let Some(value) = rule.get(key) {
            if !value.is_string() {
                let text = text_field(rule, key)?.unwrap_or_default();
                rule.insert(key.into(), Value::from(text));
                changed = true;
            }
        }
    }

    match rule.get_mut("thenActions") {
        None | Some(Value::Null) => {
            rule.insert("thenActions".into(), Value::Array(Vec::new()));
            changed = true;
        }
        Some(Value::Array(actions)) => {
            for (index, action) in actions.iter_mut().enumerate() {
                let Value::Object(action) = action else {
                    return Err(MigrationError::ActionNotAnObject(index));
                };
                changed |= tag_action(action);
            }
        }
        Some(_) => return Err(MigrationError::Malformed("thenActions")),
    }

    Ok(changed)
}

/// Give an untagged legacy action its `type` tag and default kind.
fn tag_action(action: &mut Map<String, Value>) -> bool {
    if action.contains_key("type") {
        return false;
    }

    if action.contains_key("modification") {
        action.insert("type".into(), Value::from("title"));
    } else {
        action.insert("type".into(), Value::from("property"));
        action
            .entry("action")
            .or_insert_with(|| Value::from("add"));
    }
    true
}

/// 1 -> 2: legacy operator spellings onto the six-operator enum.
///
/// The legacy default `contains` was a loose equality test and the legacy
/// `notContains` its negation, so they map to `exactly` and `notContains`.
fn remap_operator(rule: &mut Map<String, Value>) -> Result<bool, MigrationError> {
    let current = match rule.get("op") {
        None | Some(Value::Null) => None,
        Some(Value::String(op)) => Some(op.as_str()),
        Some(_) => return Err(MigrationError::Malformed("op")),
    };

    let mapped = match current {
        None | Some("contains") | Some("equals") => "exactly",
        Some("notContains") | Some("notExactly") => "notContains",
        Some(op @ ("exactly" | "exists" | "notExists" | "isEmpty")) => op,
        Some(other) => return Err(MigrationError::UnknownOperator(other.to_string())),
    };

    if current == Some(mapped) {
        return Ok(false);
    }
    let mapped = mapped.to_string();
    rule.insert("op".into(), Value::from(mapped));
    Ok(true)
}
