//! Configuration interpolation for environment variables and secrets.

use crate::config::{ProviderConfig, ProvidersConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

static SERVICE: &str = "relay";

static ENV_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{env:([\w.+-]*)\}").expect("env pattern should compile"));
static SECRET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{secret:([\w.+-]*)\}").expect("secret pattern should compile"));

/// Interpolate environment variables and secrets in the configuration.
///
/// A provider whose values cannot be resolved is disabled and keeps the error in `err`.
pub fn interpolate_config(config: &mut ProvidersConfig) {
    for (name, provider) in config.providers.iter_mut() {
        if let Err(error) = interpolate_provider(provider) {
            warn!(provider = %name, error = %error, "disabling provider with unresolved configuration");
            provider.err = Some(error.to_string());
            provider.disabled = true;
        }
        debug!("Interpolated configuration for provider: {}", name);
    }
}

fn interpolate_provider(provider: &mut ProviderConfig) -> Result<(), InterpolationError> {
    for value in provider.env.values_mut() {
        *value = interpolate_string(value)?;
    }
    for value in provider.headers.values_mut() {
        *value = interpolate_string(value)?;
    }
    for arg in provider.args.iter_mut() {
        *arg = interpolate_string(arg)?;
    }
    Ok(())
}

/// Interpolate a string value, replacing `${env:NAME}` and `${secret:NAME}` patterns.
pub fn interpolate_string(value: &str) -> Result<String, InterpolationError> {
    let mut resolved = Vec::new();

    for cap in ENV_PATTERN.captures_iter(value) {
        let var_name = cap[1].to_string();
        let env_value = std::env::var(&var_name).map_err(|_| InterpolationError::MissingEnvVar { name: var_name.clone() })?;
        debug!("Interpolated env var: {} -> [REDACTED]", var_name);
        resolved.push((cap[0].to_string(), env_value));
    }

    for cap in SECRET_PATTERN.captures_iter(value) {
        let secret_name = cap[1].to_string();
        let secret_value = resolve_secret(&secret_name)?;
        debug!("Interpolated secret: {} -> [REDACTED]", secret_name);
        resolved.push((cap[0].to_string(), secret_value));
    }

    let mut result = value.to_string();
    for (placeholder, replacement) in resolved {
        result = result.replace(&placeholder, &replacement);
    }
    Ok(result)
}

/// Resolve a secret from the OS keychain.
fn resolve_secret(name: &str) -> Result<String, InterpolationError> {
    let entry = keyring::Entry::new(SERVICE, name).map_err(|e| InterpolationError::KeyringError {
        name: name.to_string(),
        error: e.to_string(),
    })?;

    entry.get_password().map_err(|e| InterpolationError::MissingSecret {
        name: name.to_string(),
        error: e.to_string(),
    })
}

/// Errors that can occur during interpolation.
#[derive(Debug, Error, Clone)]
pub enum InterpolationError {
    #[error("Missing environment variable: {name}")]
    MissingEnvVar { name: String },

    #[error("Missing secret: {name} - {error}")]
    MissingSecret { name: String, error: String },

    #[error("Keyring error for {name}: {error}")]
    KeyringError { name: String, error: String },
}
