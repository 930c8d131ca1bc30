//! Provider registry: the catalogue of configured providers and their aliases.
//!
//! The registry is built once from configuration and is read-only afterwards, so it can be
//! shared behind an `Arc` without locking. Per-provider [`ParameterNormalizer`]s live here as
//! well so that provider-specific input quirks never leak into the executor.

use crate::config::{ConfigError, ProvidersConfig};
use indexmap::IndexMap;
use relay_types::{OperationSchema, ProviderDescriptor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Rewrites step input for one provider before it is validated against the operation schema.
pub trait ParameterNormalizer: Send + Sync {
    fn normalize(&self, operation: &OperationSchema, arguments: &mut Map<String, Value>);
}

/// Renames input keys (`from` -> `to`) when the schema does not already know `from`.
#[derive(Debug, Clone, Default)]
pub struct RenameParameters {
    renames: IndexMap<String, String>,
}

impl RenameParameters {
    pub fn new(renames: IndexMap<String, String>) -> Self {
        Self { renames }
    }
}

impl ParameterNormalizer for RenameParameters {
    fn normalize(&self, operation: &OperationSchema, arguments: &mut Map<String, Value>) {
        for (from, to) in &self.renames {
            if operation.parameters.contains_key(from) || arguments.contains_key(to) {
                continue;
            }
            if let Some(value) = arguments.remove(from) {
                arguments.insert(to.clone(), value);
            }
        }
    }
}

/// Read-only catalogue of providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, ProviderDescriptor>,
    /// Providers present in configuration but disabled, with the reason.
    disabled: IndexMap<String, String>,
    aliases: IndexMap<String, String>,
    normalizers: HashMap<String, Arc<dyn ParameterNormalizer>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("disabled", &self.disabled)
            .field("aliases", &self.aliases)
            .field("normalizers", &self.normalizers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Build a registry from descriptors and an alias table.
    pub fn new(descriptors: impl IntoIterator<Item = ProviderDescriptor>, aliases: IndexMap<String, String>) -> Self {
        let mut registry = Self {
            aliases,
            ..Default::default()
        };
        for descriptor in descriptors {
            registry.insert(descriptor);
        }
        registry
    }

    /// Build a registry from loaded configuration. Disabled providers are remembered so lookups
    /// can say why they are unavailable.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ConfigError> {
        let mut registry = Self {
            aliases: config.aliases.clone(),
            ..Default::default()
        };
        for (name, provider) in &config.providers {
            if provider.is_disabled() {
                let reason = provider.err.clone().unwrap_or_else(|| "disabled in configuration".to_string());
                debug!(provider = %name, reason = %reason, "skipping disabled provider");
                registry.disabled.insert(name.clone(), reason);
                continue;
            }
            registry.insert(provider.to_descriptor(name)?);
        }
        Ok(registry)
    }

    fn insert(&mut self, descriptor: ProviderDescriptor) {
        if !descriptor.parameter_aliases.is_empty() {
            let normalizer = RenameParameters::new(descriptor.parameter_aliases.clone());
            self.normalizers.insert(descriptor.name.clone(), Arc::new(normalizer));
        }
        self.providers.insert(descriptor.name.clone(), descriptor);
    }

    /// Register a normalizer for `provider`, replacing any configured renames.
    pub fn with_normalizer(mut self, provider: impl Into<String>, normalizer: Arc<dyn ParameterNormalizer>) -> Self {
        self.normalizers.insert(provider.into(), normalizer);
        self
    }

    /// Canonical name for `name`; identity when no alias exists.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Look up a provider by canonical or alias name.
    pub fn lookup(&self, name: &str) -> Result<&ProviderDescriptor, RegistryError> {
        let canonical = self.resolve_alias(name);
        if let Some(descriptor) = self.providers.get(canonical) {
            return Ok(descriptor);
        }
        if let Some(reason) = self.disabled.get(canonical) {
            return Err(RegistryError::Disabled {
                name: canonical.to_string(),
                reason: reason.clone(),
            });
        }
        Err(RegistryError::NotFound { name: name.to_string() })
    }

    /// Providers whose category matches, ignoring case.
    pub fn list_by_category(&self, category: &str) -> Vec<&ProviderDescriptor> {
        self.providers
            .values()
            .filter(|descriptor| {
                descriptor
                    .category
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(category))
            })
            .collect()
    }

    /// All enabled providers in configuration order.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.values()
    }

    /// Disabled providers and the reason each was disabled.
    pub fn disabled(&self) -> impl Iterator<Item = (&str, &str)> {
        self.disabled.iter().map(|(name, reason)| (name.as_str(), reason.as_str()))
    }

    /// Apply the provider's normalizer, if one is registered.
    pub fn normalize_parameters(&self, provider: &str, operation: &OperationSchema, arguments: &mut Map<String, Value>) {
        if let Some(normalizer) = self.normalizers.get(self.resolve_alias(provider)) {
            normalizer.normalize(operation, arguments);
        }
    }
}

/// Errors returned by registry lookups.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Provider not found: {name}")]
    NotFound { name: String },

    #[error("Provider '{name}' is disabled: {reason}")]
    Disabled { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use relay_types::LaunchSpec;
    use serde_json::json;

    fn descriptor(name: &str, category: Option<&str>) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            launch: LaunchSpec::Subprocess {
                command: format!("{name}-mcp"),
                args: vec![],
                env: IndexMap::new(),
                cwd: None,
            },
            category: category.map(str::to_string),
            auth_required: false,
            auth_param_names: Default::default(),
            static_operations: vec![],
            parameter_aliases: IndexMap::new(),
        }
    }

    #[test]
    fn lookup_resolves_aliases_and_reports_not_found() {
        let registry = ProviderRegistry::new(
            [descriptor("weather", Some("data"))],
            IndexMap::from([("forecast-service".to_string(), "weather".to_string())]),
        );

        assert_eq!(registry.resolve_alias("forecast-service"), "weather");
        assert_eq!(registry.resolve_alias("weather"), "weather");
        assert_eq!(registry.lookup("forecast-service").expect("alias lookup").name, "weather");
        assert_eq!(
            registry.lookup("stocks").expect_err("unknown provider"),
            RegistryError::NotFound { name: "stocks".into() }
        );
    }

    #[test]
    fn list_by_category_ignores_case() {
        let registry = ProviderRegistry::new(
            [
                descriptor("weather", Some("Data")),
                descriptor("prices", Some("data")),
                descriptor("social", Some("messaging")),
                descriptor("misc", None),
            ],
            IndexMap::new(),
        );

        let names: Vec<_> = registry.list_by_category("data").into_iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["weather", "prices"]);
    }

    #[test]
    fn disabled_providers_are_reported_with_reason() {
        let mut config = ProvidersConfig::default();
        config.providers.insert(
            "weather".to_string(),
            ProviderConfig {
                command: Some("weather-mcp".into()),
                disabled: true,
                err: Some("Missing environment variable: WEATHER_KEY".into()),
                ..Default::default()
            },
        );

        let registry = ProviderRegistry::from_config(&config).expect("registry");
        match registry.lookup("weather") {
            Err(RegistryError::Disabled { reason, .. }) => assert!(reason.contains("WEATHER_KEY")),
            other => panic!("expected disabled provider, got {other:?}"),
        }
    }

    #[test]
    fn configured_renames_apply_only_to_unknown_keys() {
        let mut weather = descriptor("weather", None);
        weather.parameter_aliases = IndexMap::from([("date".to_string(), "travel_date".to_string())]);
        let registry = ProviderRegistry::new([weather], IndexMap::new());

        let schema = OperationSchema::from_input_schema(
            "weather",
            "get_forecast",
            None,
            &json!({"properties": {"travel_date": {"type": "string"}}}),
        );
        let mut arguments = json!({"date": "2024-05-01", "city": "Paris"})
            .as_object()
            .cloned()
            .expect("object");
        registry.normalize_parameters("weather", &schema, &mut arguments);

        assert_eq!(Value::Object(arguments), json!({"travel_date": "2024-05-01", "city": "Paris"}));
    }

    #[test]
    fn custom_normalizer_replaces_configured_one() {
        struct Uppercase;
        impl ParameterNormalizer for Uppercase {
            fn normalize(&self, _operation: &OperationSchema, arguments: &mut Map<String, Value>) {
                if let Some(Value::String(station)) = arguments.get_mut("station") {
                    *station = station.to_uppercase();
                }
            }
        }

        let registry = ProviderRegistry::new([descriptor("trains", None)], IndexMap::new())
            .with_normalizer("trains", Arc::new(Uppercase));
        let schema = OperationSchema::from_input_schema("trains", "departures", None, &json!({}));
        let mut arguments = json!({"station": "pad"}).as_object().cloned().expect("object");
        registry.normalize_parameters("trains", &schema, &mut arguments);

        assert_eq!(arguments["station"], json!("PAD"));
    }
}
