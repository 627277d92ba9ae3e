//! Condition evaluation for a rule's IF clause.
//!
//! Quantifiers over list-valued properties are asymmetric:
//! - `Exactly` and `Contains` match if **some** element matches
//! - `NotContains` matches only if **every** element fails to contain
//!
//! So `tags: [a, b]` passes `Contains "a"` and fails `NotContains "a"`,
//! while `tags: [b, c]` passes `NotContains "a"`.

use tracing::trace;

use crate::normalize::{normalize, normalize_value};
use crate::rules::{IfKind, Operator};
use crate::types::MetadataValue;

/// Decide whether a condition holds for `source`.
///
/// `source` is `None` when the property (or title) is absent. A heading
/// source is always passed as a scalar.
pub fn evaluate(
    source: Option<&MetadataValue>,
    if_value: &str,
    operator: Operator,
    if_kind: IfKind,
) -> bool {
    let matched = match operator {
        Operator::Exists => exists(source),
        Operator::NotExists => !exists(source),
        Operator::IsEmpty => is_empty(source, if_kind),
        Operator::Exactly => {
            let expected = normalize(if_value);
            match source {
                Some(MetadataValue::List(items)) => {
                    items.iter().any(|item| normalize(item) == expected)
                }
                other => normalize_value(other) == expected,
            }
        }
        Operator::Contains => {
            let expected = normalize(if_value);
            if expected.is_empty() {
                return false;
            }
            match source {
                Some(MetadataValue::List(items)) => {
                    items.iter().any(|item| normalize(item).contains(&expected))
                }
                other => normalize_value(other).contains(&expected),
            }
        }
        Operator::NotContains => {
            let expected = normalize(if_value);
            if expected.is_empty() {
                return true;
            }
            match source {
                Some(MetadataValue::List(items)) => {
                    items.iter().all(|item| !normalize(item).contains(&expected))
                }
                other => !normalize_value(other).contains(&expected),
            }
        }
    };

    trace!(?operator, if_value, matched, "condition evaluated");
    matched
}

fn exists(source: Option<&MetadataValue>) -> bool {
    matches!(source, Some(value) if !value.is_null())
}

fn is_empty(source: Option<&MetadataValue>, if_kind: IfKind) -> bool {
    match source {
        // A missing heading counts as an empty title
        None => if_kind == IfKind::FirstLevelHeading,
        Some(MetadataValue::Null) => true,
        Some(MetadataValue::List(items)) => items.is_empty(),
        Some(MetadataValue::Text(s)) => normalize(s).is_empty(),
    }
}
