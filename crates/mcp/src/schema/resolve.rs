//! Local operation matching: exact names, closest substring, and keyword scoring.

use relay_types::OperationSchema;
use relay_util::{canonical_identifier, identifier_tokens, identifiers_match};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "get", "i", "in", "into", "it", "me", "my", "of", "on", "or", "please", "the", "this",
    "to", "with",
];

/// Operation whose name matches `name` exactly or up to case and separator variants.
pub(crate) fn find_exact<'a>(operations: &'a [OperationSchema], name: &str) -> Option<&'a OperationSchema> {
    operations
        .iter()
        .find(|operation| operation.operation_name == name)
        .or_else(|| operations.iter().find(|operation| identifiers_match(&operation.operation_name, name)))
}

/// Closest case-insensitive substring match between `choice` and the operation names.
///
/// Either side may contain the other; the candidate whose length is nearest to `choice` wins.
pub(crate) fn find_substring<'a>(operations: &'a [OperationSchema], choice: &str) -> Option<&'a OperationSchema> {
    let needle = canonical_identifier(choice);
    if needle.is_empty() {
        return None;
    }
    operations
        .iter()
        .filter(|operation| {
            let name = canonical_identifier(&operation.operation_name);
            name.contains(&needle) || needle.contains(&name)
        })
        .min_by_key(|operation| canonical_identifier(&operation.operation_name).len().abs_diff(needle.len()))
}

/// Best keyword overlap between `goal` and each operation's name and description.
///
/// Name hits weigh twice as much as description hits. Returns `None` when nothing overlaps.
pub(crate) fn rank_by_keywords<'a>(operations: &'a [OperationSchema], goal: &str) -> Option<&'a OperationSchema> {
    let goal_tokens: Vec<String> = identifier_tokens(goal)
        .into_iter()
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect();
    if goal_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&OperationSchema, usize)> = None;
    for operation in operations {
        let name_tokens = identifier_tokens(&operation.operation_name);
        let description_tokens = operation.description.as_deref().map(identifier_tokens).unwrap_or_default();
        let score: usize = goal_tokens
            .iter()
            .map(|token| {
                let in_name = name_tokens.iter().any(|candidate| stems_match(candidate, token));
                let in_description = description_tokens.iter().any(|candidate| stems_match(candidate, token));
                usize::from(in_name) * 2 + usize::from(in_description)
            })
            .sum();
        if score > 0 && best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((operation, score));
        }
    }
    best.map(|(operation, _)| operation)
}

/// Equal words, or one a plural/verb-form extension of the other ("post" / "posts").
fn stems_match(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    let (short, long) = if left.len() <= right.len() { (left, right) } else { (right, left) };
    short.len() >= 4 && long.starts_with(short) && long.len() - short.len() <= 3
}
