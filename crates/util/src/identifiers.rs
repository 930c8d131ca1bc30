//! Canonical forms for operation and parameter names.
//!
//! Providers publish names like `get-forecast`, `getForecast` or `Get Forecast` for the same
//! operation; comparisons go through [`canonical_identifier`] so authors can use any of them.

use heck::ToSnakeCase;

/// Snake-case form used to compare identifiers.
///
/// ```rust
/// use relay_util::canonical_identifier;
///
/// assert_eq!(canonical_identifier("get-forecast"), "get_forecast");
/// assert_eq!(canonical_identifier("getForecast"), "get_forecast");
/// ```
pub fn canonical_identifier(name: &str) -> String {
    name.trim().to_snake_case()
}

/// Whether two identifiers name the same thing after canonicalization.
pub fn identifiers_match(left: &str, right: &str) -> bool {
    canonical_identifier(left) == canonical_identifier(right)
}

/// Lowercase word tokens of an identifier or free-form phrase.
pub fn identifier_tokens(text: &str) -> Vec<String> {
    text.to_snake_case()
        .split('_')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphen_and_underscore_variants_match() {
        assert!(identifiers_match("send-message", "send_message"));
        assert!(identifiers_match("SendMessage", "send_message"));
        assert!(!identifiers_match("send_message", "send_messages"));
    }

    #[test]
    fn tokens_split_phrases_and_identifiers() {
        assert_eq!(identifier_tokens("createIssue"), vec!["create", "issue"]);
        assert_eq!(identifier_tokens("Post a price update!"), vec!["post", "a", "price", "update"]);
    }
}
