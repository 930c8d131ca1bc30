//! HTTP helpers for network providers.

use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::warn;

/// Build a reqwest client sending the configured (and injected) headers on every request.
pub(crate) fn build_http_client(headers: &IndexMap<String, String>, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        if value.is_empty() {
            continue;
        }
        match (HeaderName::try_from(key.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(mut value)) => {
                value.set_sensitive(true);
                header_map.insert(name, value);
            }
            _ => warn!(header = %key, "skipping header that is not valid HTTP"),
        }
    }
    reqwest::Client::builder().default_headers(header_map).timeout(timeout).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_skipping_empty_headers() {
        let headers = IndexMap::from([
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("X-Empty".to_string(), String::new()),
        ]);
        assert!(build_http_client(&headers, Duration::from_secs(5)).is_ok());
    }
}
