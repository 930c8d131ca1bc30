//! Transport-neutral session traits.

use crate::types::{CallError, ConnectionError};
use async_trait::async_trait;
use relay_types::LaunchSpec;
use serde_json::{Map, Value};
use std::sync::Arc;

/// An operation as advertised by a live provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOperation {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Opens sessions to providers.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    /// Start or reach `provider` and complete the protocol handshake.
    async fn connect(&self, provider: &str, launch: &LaunchSpec) -> Result<Arc<dyn ProviderSession>, ConnectionError>;
}

/// A live, handshaken connection to one provider.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// Operations the provider currently exposes.
    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, CallError>;

    /// Invoke `operation` and return the provider's raw result envelope.
    async fn call(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, CallError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), CallError>;

    /// Tear the session down. Subprocess providers are terminated.
    async fn close(&self);
}
