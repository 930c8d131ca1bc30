//! Data models for provider configuration.

use indexmap::{IndexMap, IndexSet};
use relay_types::{LaunchSpec, OperationSchema, ProviderDescriptor, TransportKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NETWORK_RETRIES: u32 = 3;

/// Provider configuration containing all configured providers and the alias table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Map of canonical provider names to provider configurations.
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Alternate or historical names mapped to canonical names.
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
}

/// Configuration for a single provider.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    /// Command to execute for the subprocess transport.
    pub command: Option<String>,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables to set for the process.
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Working directory for the process.
    pub cwd: Option<PathBuf>,

    /// Base URL for the network transport.
    pub base_url: Option<Url>,

    /// Per-request timeout for the network transport.
    pub timeout_secs: Option<u64>,

    /// Attempts per call for the network transport.
    pub retries: Option<u32>,

    /// HTTP headers to include in requests.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    pub category: Option<String>,

    /// Whether calls need a verified user credential.
    #[serde(default)]
    pub auth_required: bool,

    /// Credential keys expected in `env` (subprocess) or `headers` (network).
    #[serde(default)]
    pub auth_params: Vec<String>,

    /// Input parameter renames (`from` -> `to`).
    #[serde(default)]
    pub parameter_aliases: IndexMap<String, String>,

    /// Operations declared up front.
    #[serde(default)]
    pub operations: Vec<OperationConfig>,

    /// Whether this provider is disabled.
    #[serde(default)]
    pub disabled: bool,

    /// Why the provider was disabled while loading, if it was.
    #[serde(skip)]
    pub err: Option<String>,
}

/// A pre-declared operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationConfig {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ProviderConfig {
    /// Get the transport for this provider, if exactly one is configured.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match (&self.command, &self.base_url) {
            (Some(_), None) => Some(TransportKind::Subprocess),
            (None, Some(_)) => Some(TransportKind::Network),
            _ => None,
        }
    }

    /// Check if this provider is disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Build the immutable registry entry for this provider.
    pub fn to_descriptor(&self, name: &str) -> Result<ProviderDescriptor, ConfigError> {
        let launch = match (&self.command, &self.base_url) {
            (Some(command), None) => LaunchSpec::Subprocess {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
                cwd: self.cwd.clone(),
            },
            (None, Some(base_url)) => LaunchSpec::Network {
                base_url: base_url.clone(),
                timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS),
                retries: self.retries.unwrap_or(DEFAULT_NETWORK_RETRIES),
                headers: self.headers.clone(),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    message: format!("provider '{name}' must set exactly one of 'command' or 'baseUrl'"),
                });
            }
        };

        let static_operations = self
            .operations
            .iter()
            .map(|operation| {
                OperationSchema::from_input_schema(name, &operation.name, operation.description.clone(), &operation.input_schema)
            })
            .collect();

        Ok(ProviderDescriptor {
            name: name.to_string(),
            launch,
            category: self.category.clone(),
            auth_required: self.auth_required,
            auth_param_names: self.auth_params.iter().cloned().collect::<IndexSet<_>>(),
            static_operations,
            parameter_aliases: self.parameter_aliases.clone(),
        })
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] crate::config::ValidationError),

    #[error("Configuration error: {message}")]
    Invalid { message: String },
}
