//! # Text Processing Utilities
//!
//! Redaction of secret-looking values before they reach logs or users, and extraction of JSON
//! payloads embedded in free-form generated text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Redacts values that look like secrets in a string.
///
/// Key names are preserved so the output stays useful for debugging.
///
/// # Example
/// ```rust
/// use relay_util::redact_sensitive;
///
/// assert_eq!(redact_sensitive("API_KEY=abc123"), "API_KEY=[REDACTED]");
/// assert_eq!(redact_sensitive("Authorization: Bearer secret123"), "Authorization: [REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, "[REDACTED]")
}

/// Redacts sensitive-looking values, using a custom replacement token.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();

    for pattern in redact_patterns().iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let value = captures.get(2);
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                if value.is_some() {
                    format!("{}{}{}", prefix, replacement, suffix)
                } else {
                    replacement.to_string()
                }
            })
            .to_string();
    }

    redacted
}

/// Recursively redacts every string inside a JSON value.
pub fn redact_json(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::String(redact_sensitive(s)),
        Value::Array(arr) => Value::Array(arr.iter().map(redact_json).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, val) in map.iter() {
                out.insert(k.clone(), redact_json(val));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn redact_patterns() -> &'static Vec<Regex> {
    static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

    &REDACT_PATTERNS
}

fn build_redact_patterns() -> Vec<Regex> {
    const SENSITIVE_KEYWORDS: &[&str] = &[
        "ACCESS_KEY",
        "API_KEY",
        "API_TOKEN",
        "AUTH_TOKEN",
        "BEARER_TOKEN",
        "CLIENT_SECRET",
        "CONNECTION_STRING",
        "DATABASE_URL",
        "PASSWORD",
        "PRIVATE_KEY",
        "REFRESH_TOKEN",
        "SECRET",
        "SESSION_TOKEN",
        "TOKEN",
        "WEBHOOK_SECRET",
    ];
    let keywords = SENSITIVE_KEYWORDS
        .iter()
        .map(|keyword| keyword.split('_').map(regex::escape).collect::<Vec<_>>().join("[_\\-]?"))
        .collect::<Vec<_>>()
        .join("|");

    let sources = [
        // Bare well-known token formats.
        r"(?i)((?:gh[oprsu]|github_pat)_[A-Za-z0-9_]{22,40})".to_string(),
        r"(?i)(sk_(?:live|test)_[A-Za-z0-9]{16,})".to_string(),
        r"(?i)(xox[aboprs]-(?:\d+-)+[\da-z]+)".to_string(),
        r"(eyJ[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]+)".to_string(),
        // Authorization headers.
        r"(?i)(authorization:\s+)([^\s]+(?:\s+[^\s]+)*)".to_string(),
        r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)".to_string(),
        // KEY=value assignments.
        format!(r"(?i)((?:export\s+)?[A-Za-z0-9_]*?(?:{keywords})[A-Za-z0-9_]*\s*=\s*)([^\s]+)"),
        // "key": "value" entries.
        format!("(?i)((?:\"|')?[A-Za-z0-9_.-]*?(?:{keywords})[A-Za-z0-9_.-]*[\"']?\\s*:\\s*(?:\"|'))([^\"']+)((?:\"|'))"),
    ];

    sources
        .iter()
        .map(|source| Regex::new(source).expect("static redaction pattern"))
        .collect()
}

/// Extracts a JSON value from free-form text.
///
/// Accepts bare JSON, JSON wrapped in a fenced code block, or the first balanced `{...}` /
/// `[...]` region embedded in prose. Returns `None` when no parseable JSON is present.
pub fn parse_embedded_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static fence pattern"));
    if let Some(captures) = FENCE.captures(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(captures[1].trim())
    {
        return Some(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(start) = trimmed.find(open)
            && let Some(end) = trimmed.rfind(close)
            && end > start
            && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
        {
            return Some(value);
        }
    }
    None
}
