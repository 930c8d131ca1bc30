//! Response classification: application-level errors and side-effecting operations.
//!
//! Providers frequently answer a failed request with a perfectly valid result envelope whose
//! payload describes the failure. [`classify_response`] is a best-effort heuristic over that
//! payload and is the only place the engine makes this call.

use once_cell::sync::Lazy;
use regex::Regex;
use relay_mcp::normalize_result;
use relay_util::{identifier_tokens, parse_embedded_json, redact_sensitive};
use serde_json::{Map, Value};

/// Verbs whose operations have external side effects.
const CRITICAL_VERBS: &[&str] = &[
    "create", "send", "post", "publish", "transfer", "buy", "sell", "execute", "deploy", "delete",
];

const ERROR_KEYWORDS: &[&str] = &["unauthorized", "forbidden", "rate limit", "invalid", "exception"];

const ERROR_STATUSES: &[&str] = &["error", "failed", "failure", "fail", "unauthorized", "forbidden"];

const MAX_ERROR_MESSAGE_CHARS: usize = 300;

/// Whether an operation name (or goal text) carries a side-effecting verb.
///
/// Matching is by word, so `publish_post` and `createIssue` are critical while `postal_code`
/// is not.
pub fn is_critical_operation(name: &str) -> bool {
    identifier_tokens(name).iter().any(|token| CRITICAL_VERBS.contains(&token.as_str()))
}

/// `Err` with a readable message when a successful call carries an application error.
pub fn classify_response(raw: &Value) -> Result<(), String> {
    let text = match normalize_result(raw) {
        Value::String(text) => text,
        other => other.to_string(),
    };

    if raw.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(error_message(&text, "provider reported an error"));
    }

    let structured = raw
        .get("structuredContent")
        .filter(|value| value.is_object())
        .cloned()
        .or_else(|| parse_embedded_json(&text).filter(Value::is_object))
        .or_else(|| raw.as_object().filter(|object| !object.contains_key("content")).map(|object| Value::Object(object.clone())));

    if let Some(Value::Object(object)) = &structured {
        if has_success_markers(object) {
            return Ok(());
        }
        if let Some(message) = explicit_failure(object) {
            return Err(error_message(&message, "provider reported an error"));
        }
    }

    let lowered = text.to_lowercase();
    static ERROR_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\berror\b").expect("static error pattern"));
    if ERROR_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) || ERROR_WORD.is_match(&lowered) {
        return Err(error_message(&text, "provider reported an error"));
    }
    Ok(())
}

fn has_success_markers(object: &Map<String, Value>) -> bool {
    let present = |key: &str| object.get(key).is_some_and(|value| !value.is_null());
    if object.get("success").and_then(Value::as_bool) == Some(false) || object.get("ok").and_then(Value::as_bool) == Some(false) {
        return false;
    }
    if object.get("success").and_then(Value::as_bool) == Some(true) || object.get("ok").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    if present("data") || present("result") || present("results") {
        return true;
    }
    match object.get("status") {
        Some(Value::String(status)) => !ERROR_STATUSES.contains(&status.to_lowercase().as_str()),
        Some(Value::Number(code)) => code.as_u64().is_some_and(|code| (200..400).contains(&code)),
        _ => false,
    }
}

fn explicit_failure(object: &Map<String, Value>) -> Option<String> {
    let error = object.get("error").or_else(|| object.get("errors")).filter(|value| match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    });
    if let Some(error) = error {
        return Some(match error {
            Value::String(text) => text.clone(),
            Value::Object(details) => details
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            other => other.to_string(),
        });
    }
    if object.get("success").and_then(Value::as_bool) == Some(false) || object.get("ok").and_then(Value::as_bool) == Some(false) {
        return Some(
            object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("operation reported failure")
                .to_string(),
        );
    }
    None
}

fn error_message(text: &str, fallback: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return fallback.to_string();
    }
    let redacted = redact_sensitive(text);
    if redacted.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return redacted;
    }
    let truncated: String = redacted.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    format!("{truncated}…")
}
