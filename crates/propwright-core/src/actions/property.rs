//! Property mutations: Add, Remove, Overwrite, Delete.

use tracing::debug;

use crate::normalize::{normalize, values_equal};
use crate::rules::{PropertyAction, PropertyActionKind};
use crate::types::{MetadataStore, MetadataValue};

/// Split an action value on commas, trimming and dropping empty tokens.
pub fn split_values(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply `action` to the working copy. Returns whether the action
/// reported a change.
///
/// Only Delete matches the property name case-insensitively; Add, Remove
/// and Overwrite address the exact key.
pub fn apply_property(
    working: &mut MetadataStore,
    action: &PropertyAction,
    expanded_value: &str,
) -> bool {
    let property = action.property.as_str();

    let changed = match action.kind {
        PropertyActionKind::Add => add(working, property, split_values(expanded_value)),
        PropertyActionKind::Remove => remove(working, property, &split_values(expanded_value)),
        PropertyActionKind::Overwrite => {
            working.insert(
                property.to_string(),
                MetadataValue::text(expanded_value),
            );
            true
        }
        PropertyActionKind::Delete => delete(working, property),
    };

    debug!(
        property,
        kind = ?action.kind,
        value = expanded_value,
        changed,
        "property action applied"
    );
    changed
}

fn add(working: &mut MetadataStore, property: &str, tokens: Vec<String>) -> bool {
    if tokens.is_empty() {
        return false;
    }

    let mut items = match working.get(property) {
        Some(MetadataValue::List(items)) => items.clone(),
        Some(MetadataValue::Text(s)) if !normalize(s).is_empty() => vec![s.clone()],
        // Absent, null or empty: set directly
        _ => {
            let mut fresh = Vec::with_capacity(tokens.len());
            append_unique(&mut fresh, tokens);
            working.insert(property.to_string(), MetadataValue::from_items(fresh));
            return true;
        }
    };

    if !append_unique(&mut items, tokens) {
        return false;
    }
    working.insert(property.to_string(), MetadataValue::from_items(items));
    true
}

/// Append tokens not already present. Returns whether anything was added.
fn append_unique(items: &mut Vec<String>, tokens: Vec<String>) -> bool {
    let before = items.len();
    for token in tokens {
        if !items.iter().any(|item| values_equal(item, &token)) {
            items.push(token);
        }
    }
    items.len() > before
}

fn remove(working: &mut MetadataStore, property: &str, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let matches_token = |item: &str| tokens.iter().any(|token| values_equal(item, token));

    match working.get(property) {
        Some(MetadataValue::List(items)) => {
            let kept: Vec<String> = items
                .iter()
                .filter(|item| !matches_token(item.as_str()))
                .cloned()
                .collect();
            if kept.len() == items.len() {
                return false;
            }
            working.insert(property.to_string(), MetadataValue::from_items(kept));
            true
        }
        Some(MetadataValue::Text(s)) if matches_token(s.as_str()) => {
            working.remove(property);
            true
        }
        _ => false,
    }
}

fn delete(working: &mut MetadataStore, property: &str) -> bool {
    let key = if working.contains_key(property) {
        Some(property.to_string())
    } else {
        let wanted = property.to_lowercase();
        working.keys().find(|k| k.to_lowercase() == wanted).cloned()
    };

    match key {
        Some(key) => {
            working.remove(&key);
            true
        }
        None => false,
    }
}
