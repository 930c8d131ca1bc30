//! Provider catalogue entries and the operation schemas they expose.
//!
//! A [`ProviderDescriptor`] is created once from configuration and never mutated. Operation
//! schemas are either pre-declared on the descriptor or discovered from a live connection;
//! both paths end up as [`OperationSchema`] values built from a JSON-schema-like parameter
//! definition.

use std::path::PathBuf;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// How a provider is reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// A child process speaking over stdin/stdout.
    Subprocess,
    /// A remote service reached over HTTP.
    Network,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Subprocess => write!(f, "subprocess"),
            TransportKind::Network => write!(f, "network"),
        }
    }
}

/// Parameters needed to start or reach a provider.
///
/// Credential injection produces a copy of this value with secrets merged into `env`
/// (subprocess) or `headers` (network); the copy lives only for one acquisition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum LaunchSpec {
    Subprocess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: IndexMap<String, String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    Network {
        base_url: Url,
        /// Per-request timeout in seconds.
        timeout_secs: u64,
        /// Maximum attempts for a single operation call.
        retries: u32,
        #[serde(default)]
        headers: IndexMap<String, String>,
    },
}

impl LaunchSpec {
    /// Transport implied by this launch specification.
    pub fn transport(&self) -> TransportKind {
        match self {
            LaunchSpec::Subprocess { .. } => TransportKind::Subprocess,
            LaunchSpec::Network { .. } => TransportKind::Network,
        }
    }

    /// Key/value pairs carrying credentials for this transport.
    pub fn credential_slots(&self) -> &IndexMap<String, String> {
        match self {
            LaunchSpec::Subprocess { env, .. } => env,
            LaunchSpec::Network { headers, .. } => headers,
        }
    }

    /// Mutable access to the credential-carrying map.
    pub fn credential_slots_mut(&mut self) -> &mut IndexMap<String, String> {
        match self {
            LaunchSpec::Subprocess { env, .. } => env,
            LaunchSpec::Network { headers, .. } => headers,
        }
    }
}

/// Immutable catalogue entry for one logical provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Unique canonical name.
    pub name: String,
    /// Launch or connection parameters.
    pub launch: LaunchSpec,
    /// Free-form grouping used by `list_by_category`.
    #[serde(default)]
    pub category: Option<String>,
    /// Whether the provider needs a verified user credential.
    #[serde(default)]
    pub auth_required: bool,
    /// Credential keys the provider expects in its env or headers.
    #[serde(default)]
    pub auth_param_names: IndexSet<String>,
    /// Operations declared up front, skipping discovery when non-empty.
    #[serde(default)]
    pub static_operations: Vec<OperationSchema>,
    /// Parameter renames applied to step input before validation (`from` -> `to`).
    #[serde(default)]
    pub parameter_aliases: IndexMap<String, String>,
}

impl ProviderDescriptor {
    /// Transport used to reach this provider.
    pub fn transport(&self) -> TransportKind {
        self.launch.transport()
    }

    /// Non-empty static value configured for a credential key, if any.
    pub fn static_value(&self, key: &str) -> Option<&str> {
        self.launch
            .credential_slots()
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Primitive type declared for a parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// No usable type information; values pass through untouched.
    #[default]
    Any,
}

impl ParameterType {
    fn from_schema_type(value: Option<&Value>) -> Self {
        let name = match value {
            Some(Value::String(name)) => Some(name.as_str()),
            // Nullable unions such as ["string", "null"] use the first concrete type.
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).find(|name| *name != "null"),
            _ => None,
        };
        match name {
            Some("string") => ParameterType::String,
            Some("number") => ParameterType::Number,
            Some("integer") => ParameterType::Integer,
            Some("boolean") => ParameterType::Boolean,
            Some("array") => ParameterType::Array,
            Some("object") => ParameterType::Object,
            _ => ParameterType::Any,
        }
    }

    /// Lowercase name matching the JSON-schema vocabulary.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
            ParameterType::Any => "any",
        }
    }
}

/// Declared shape of a single parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element schema for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSpec>>,
    /// Member schemas for objects.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, ParameterSpec>,
}

impl ParameterSpec {
    /// Build a parameter spec from a JSON-schema fragment.
    pub fn from_json_schema(schema: &Value, required: bool) -> Self {
        let Some(object) = schema.as_object() else {
            return ParameterSpec {
                required,
                ..Default::default()
            };
        };

        let mut kind = ParameterType::from_schema_type(object.get("type"));
        if kind == ParameterType::Any && object.contains_key("properties") {
            kind = ParameterType::Object;
        }

        let items = object
            .get("items")
            .map(|items| Box::new(ParameterSpec::from_json_schema(items, false)));

        Self {
            kind,
            required,
            default: object.get("default").cloned(),
            enum_values: object.get("enum").and_then(Value::as_array).cloned().unwrap_or_default(),
            description: object.get("description").and_then(Value::as_str).map(str::to_string),
            items,
            properties: properties_from_schema(schema),
        }
    }
}

fn properties_from_schema(schema: &Value) -> IndexMap<String, ParameterSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(name, fragment)| {
                    let is_required = required.contains(&name.as_str());
                    (name.clone(), ParameterSpec::from_json_schema(fragment, is_required))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// One named, independently callable capability of a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationSchema {
    pub provider_name: String,
    pub operation_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterSpec>,
}

impl OperationSchema {
    /// Build an operation schema from an `inputSchema` object as published by a provider.
    pub fn from_input_schema(
        provider_name: impl Into<String>,
        operation_name: impl Into<String>,
        description: Option<String>,
        input_schema: &Value,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            operation_name: operation_name.into(),
            description,
            parameters: properties_from_schema(input_schema),
        }
    }

    /// Names of parameters that must be supplied.
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }
}
