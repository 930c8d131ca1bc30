//! Flattening of provider result envelopes.

use serde_json::Value;

/// Collapse a provider's raw result into one canonical value.
///
/// - Strings are returned unchanged.
/// - Content arrays (top-level or under `content`) are concatenated with newlines. Plain string
///   items take precedence over typed `{"type": "text", "text": ...}` blocks; a single text block
///   yields exactly its text.
/// - With no text content, `structuredContent` is preferred, then the remaining content items.
/// - Anything else is returned as-is.
pub fn normalize_result(raw: &Value) -> Value {
    match raw {
        Value::String(_) => raw.clone(),
        Value::Array(items) => normalize_content(items).unwrap_or_else(|| raw.clone()),
        Value::Object(envelope) => {
            let content = envelope.get("content").and_then(Value::as_array);
            if let Some(text) = content.and_then(|items| collect_text(items)) {
                return text;
            }
            if let Some(structured) = envelope.get("structuredContent").filter(|value| !value.is_null()) {
                return structured.clone();
            }
            match content {
                Some(items) if !items.is_empty() => unwrap_single(items),
                _ => raw.clone(),
            }
        }
        _ => raw.clone(),
    }
}

fn normalize_content(items: &[Value]) -> Option<Value> {
    if items.is_empty() {
        return None;
    }
    collect_text(items).or_else(|| Some(unwrap_single(items)))
}

fn collect_text(items: &[Value]) -> Option<Value> {
    let plain: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
    if !plain.is_empty() {
        return Some(Value::String(plain.join("\n")));
    }

    let blocks: Vec<&str> = items.iter().filter_map(text_block).collect();
    match blocks.as_slice() {
        [] => None,
        [single] => Some(Value::String((*single).to_string())),
        many => Some(Value::String(many.join("\n"))),
    }
}

fn text_block(item: &Value) -> Option<&str> {
    let block = item.as_object()?;
    let kind = block.get("type").and_then(Value::as_str);
    if kind.is_some_and(|kind| kind != "text") {
        return None;
    }
    block.get("text").and_then(Value::as_str)
}

fn unwrap_single(items: &[Value]) -> Value {
    match items {
        [single] => single.clone(),
        many => Value::Array(many.to_vec()),
    }
}
