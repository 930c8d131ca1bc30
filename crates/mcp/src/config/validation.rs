//! Configuration validation for providers and aliases.

use crate::config::{ProviderConfig, ProvidersConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use relay_types::TransportKind;
use thiserror::Error;
use tracing::debug;

static PROVIDER_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9._-]+$").expect("provider name regex should compile"));
static ENV_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("env key regex should compile"));

/// Validate the entire provider configuration.
pub fn validate_config(config: &ProvidersConfig) -> Result<(), ValidationError> {
    for (name, provider) in &config.providers {
        validate_provider_name(name)?;
        validate_provider(name, provider)?;
        debug!("Validated provider configuration: {}", name);
    }
    for (alias, target) in &config.aliases {
        validate_provider_name(alias)?;
        if config.providers.contains_key(alias) {
            return Err(ValidationError::InvalidAlias {
                alias: alias.clone(),
                reason: "alias shadows a configured provider".to_string(),
            });
        }
        if !config.providers.contains_key(target) {
            return Err(ValidationError::InvalidAlias {
                alias: alias.clone(),
                reason: format!("target '{target}' is not a configured provider"),
            });
        }
    }
    Ok(())
}

/// Validate a provider name.
pub fn validate_provider_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidProviderName {
            name: name.to_string(),
            reason: "Provider name cannot be empty".to_string(),
        });
    }

    if !PROVIDER_NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidProviderName {
            name: name.to_string(),
            reason: "Provider name must contain only lowercase letters, numbers, dots, underscores, and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validate a single provider configuration.
pub fn validate_provider(name: &str, provider: &ProviderConfig) -> Result<(), ValidationError> {
    match provider.transport_kind() {
        Some(TransportKind::Subprocess) => validate_subprocess_provider(provider),
        Some(TransportKind::Network) => validate_network_provider(provider),
        None => Err(ValidationError::InvalidTransport {
            name: name.to_string(),
            reason: "Provider must have exactly one of 'command' (subprocess) or 'baseUrl' (network)".to_string(),
        }),
    }
}

fn validate_subprocess_provider(provider: &ProviderConfig) -> Result<(), ValidationError> {
    if provider.command.as_deref().is_some_and(|command| command.trim().is_empty()) {
        return Err(ValidationError::MissingRequiredField {
            field: "command".to_string(),
            transport: TransportKind::Subprocess,
        });
    }

    for key in provider.env.keys().chain(provider.auth_params.iter()) {
        validate_env_key(key)?;
    }

    Ok(())
}

fn validate_network_provider(provider: &ProviderConfig) -> Result<(), ValidationError> {
    if let Some(url) = &provider.base_url {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ValidationError::UnsupportedScheme {
                scheme: scheme.to_string(),
            });
        }
    }

    if provider.timeout_secs == Some(0) {
        return Err(ValidationError::InvalidValue {
            field: "timeoutSecs".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    if provider.retries == Some(0) {
        return Err(ValidationError::InvalidValue {
            field: "retries".to_string(),
            reason: "must allow at least one attempt".to_string(),
        });
    }

    for name in provider.headers.keys().chain(provider.auth_params.iter()) {
        validate_header_name(name)?;
    }

    Ok(())
}

fn validate_env_key(key: &str) -> Result<(), ValidationError> {
    if !ENV_KEY_REGEX.is_match(key) {
        return Err(ValidationError::InvalidEnvKey {
            key: key.to_string(),
            reason: "Environment variable keys must start with uppercase letter or underscore, followed by uppercase letters, numbers, or underscores".to_string(),
        });
    }

    Ok(())
}

fn validate_header_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidHeaderName {
            name: name.to_string(),
            reason: "Header name cannot be empty".to_string(),
        });
    }

    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::InvalidHeaderName {
            name: name.to_string(),
            reason: "Header name cannot contain whitespace or control characters".to_string(),
        });
    }

    Ok(())
}

/// Errors that can occur during validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid provider name '{name}': {reason}")]
    InvalidProviderName { name: String, reason: String },

    #[error("Invalid transport configuration for '{name}': {reason}")]
    InvalidTransport { name: String, reason: String },

    #[error("Missing required field '{field}' for {transport} transport")]
    MissingRequiredField { field: String, transport: TransportKind },

    #[error("Unsupported URL scheme: {scheme} (expected http/https)")]
    UnsupportedScheme { scheme: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid environment variable key '{key}': {reason}")]
    InvalidEnvKey { key: String, reason: String },

    #[error("Invalid HTTP header name '{name}': {reason}")]
    InvalidHeaderName { name: String, reason: String },

    #[error("Invalid alias '{alias}': {reason}")]
    InvalidAlias { alias: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use url::Url;

    fn subprocess(command: &str) -> ProviderConfig {
        ProviderConfig {
            command: Some(command.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn provider_names() {
        assert!(validate_provider_name("weather").is_ok());
        assert!(validate_provider_name("social-media_v2.1").is_ok());

        assert!(validate_provider_name("").is_err());
        assert!(validate_provider_name("Weather").is_err());
        assert!(validate_provider_name("my provider").is_err());
    }

    #[test]
    fn subprocess_provider_rejects_lowercase_env_keys() {
        let mut provider = subprocess("weather-mcp");
        assert!(validate_provider("weather", &provider).is_ok());

        provider.env.insert("api_key".to_string(), "x".to_string());
        assert!(matches!(
            validate_provider("weather", &provider),
            Err(ValidationError::InvalidEnvKey { .. })
        ));
    }

    #[test]
    fn network_provider_requires_http_scheme() {
        let provider = ProviderConfig {
            base_url: Some(Url::parse("ws://example.com").expect("url")),
            ..Default::default()
        };
        assert!(matches!(
            validate_provider("social", &provider),
            Err(ValidationError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn provider_without_transport_is_rejected() {
        assert!(matches!(
            validate_provider("empty", &ProviderConfig::default()),
            Err(ValidationError::InvalidTransport { .. })
        ));
    }

    #[test]
    fn aliases_must_target_known_providers() {
        let mut config = ProvidersConfig {
            providers: IndexMap::from([("weather".to_string(), subprocess("weather-mcp"))]),
            aliases: IndexMap::from([("forecast".to_string(), "weather".to_string())]),
        };
        assert!(validate_config(&config).is_ok());

        config.aliases.insert("legacy".to_string(), "missing".to_string());
        assert!(matches!(validate_config(&config), Err(ValidationError::InvalidAlias { .. })));

        config.aliases.shift_remove("legacy");
        config.aliases.insert("weather".to_string(), "weather".to_string());
        assert!(matches!(validate_config(&config), Err(ValidationError::InvalidAlias { .. })));
    }
}
