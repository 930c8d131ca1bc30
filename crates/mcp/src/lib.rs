//! Tool-provider infrastructure for Relay.
//!
//! This crate owns everything between a workflow step and a remote operation: the provider
//! registry and its configuration, credential injection, live connections over the Model
//! Context Protocol, captured provider logs, and the schema adapter that resolves, validates
//! and normalizes calls.

pub mod client;
pub mod config;
pub mod credentials;
pub mod generation;
pub mod logging;
pub mod registry;
pub mod schema;
pub mod types;

pub use client::{CallOutcome, ConnectionManager, ProviderConnector, ProviderHandle, ProviderSession, RetryPolicy, RmcpConnector};
pub use config::{ConfigError, ProviderConfig, ProvidersConfig};
pub use credentials::{CredentialInjector, CredentialStore, CredentialStoreError, InMemoryCredentialStore, KeyringCredentialStore};
pub use generation::{DisabledTextGenerator, TextGenerator};
pub use logging::LogManager;
pub use registry::{ParameterNormalizer, ProviderRegistry, RegistryError, RenameParameters};
pub use schema::{ResolvedOperation, SchemaAdapter, SchemaCatalog, SchemaError, Selection, normalize_result};
pub use types::{CallError, ConnectionError, ConnectionState, HealthStatus, ProviderStatus};
