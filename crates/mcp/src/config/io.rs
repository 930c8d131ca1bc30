//! Configuration IO helpers for provider configuration.

use crate::config::{ConfigError, ProvidersConfig, interpolate_config, validate_config};
use dirs_next::config_dir;
use relay_util::expand_tilde;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns the default path for the provider configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var("RELAY_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("relay").join("providers.json")
}

/// Explicit path when given, otherwise [`default_config_path`].
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => expand_tilde(&path.to_string_lossy()),
        None => default_config_path(),
    }
}

/// Loads and parses provider configuration from the default path.
pub fn load_config() -> Result<ProvidersConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads, interpolates and validates provider configuration from a specific path.
///
/// A missing file yields an empty configuration.
pub fn load_config_from_path(path: &Path) -> Result<ProvidersConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "provider configuration not found, using empty configuration");
        return Ok(ProvidersConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let mut config: ProvidersConfig = serde_json::from_str(&content)?;
    interpolate_config(&mut config);
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_honors_environment_override() {
        let override_path = "~/custom/relay/providers.json";
        temp_env::with_var("RELAY_CONFIG_PATH", Some(override_path), || {
            assert_eq!(default_config_path(), expand_tilde(override_path));
        });
    }

    #[test]
    fn explicit_path_wins_over_environment() {
        temp_env::with_var("RELAY_CONFIG_PATH", Some("/from/env.json"), || {
            assert_eq!(
                resolve_config_path(Some(Path::new("/explicit.json"))),
                PathBuf::from("/explicit.json")
            );
        });
    }

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_path(&dir.path().join("absent.json")).expect("load");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn loads_and_validates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("providers.json");
        fs::write(
            &path,
            r#"{"providers": {"Weather": {"command": "weather-mcp"}}}"#,
        )
        .expect("write config");

        assert!(matches!(load_config_from_path(&path), Err(ConfigError::Validation(_))));

        fs::write(&path, r#"{"providers": {"weather": {"command": "weather-mcp"}}}"#).expect("write config");
        let config = load_config_from_path(&path).expect("load");
        assert_eq!(config.providers.len(), 1);
    }
}
