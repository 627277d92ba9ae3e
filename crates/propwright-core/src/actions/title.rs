//! Title mutations: Prefix, Suffix, Overwrite.

use tracing::debug;

use crate::rules::{TitleAction, TitleModification};

/// Compute the new title for `action`.
///
/// Returns `Some(new_title)` when the action applies and `None` when it is
/// skipped. Titles are kept trimmed, the way a heading line reads back, and
/// every modification is a no-op once it has taken effect, so re-running a
/// rule never stacks prefixes or suffixes.
pub fn apply_title(
    current: Option<&str>,
    action: &TitleAction,
    expanded_text: &str,
) -> Option<String> {
    let next = match (action.modification, current) {
        // An empty heading reads back as no title at all
        (TitleModification::Overwrite, _) if expanded_text.trim().is_empty() => None,
        (TitleModification::Overwrite, None) => Some(expanded_text.trim().to_string()),
        (TitleModification::Overwrite, Some(title)) => {
            let target = expanded_text.trim();
            (title != target).then(|| target.to_string())
        }
        // Prefix and suffix never fabricate a title
        (TitleModification::Prefix | TitleModification::Suffix, None) => None,
        (TitleModification::Prefix, Some(title)) => (!title
            .starts_with(expanded_text.trim_start()))
        .then(|| format!("{expanded_text}{title}").trim().to_string()),
        (TitleModification::Suffix, Some(title)) => (!title
            .ends_with(expanded_text.trim_end()))
        .then(|| format!("{title}{expanded_text}").trim().to_string()),
    };

    debug!(
        modification = ?action.modification,
        text = expanded_text,
        applied = next.is_some(),
        "title action evaluated"
    );
    next
}
