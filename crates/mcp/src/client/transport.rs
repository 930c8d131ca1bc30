//! rmcp-backed provider sessions over stdio or streamable HTTP.

use std::{process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use relay_types::LaunchSpec;
use rmcp::{
    RoleClient,
    model::CallToolRequestParams,
    service::{Peer, RunningService, ServiceError, ServiceExt as _},
    transport::{StreamableHttpClientTransport, TokioChildProcess, streamable_http_client::StreamableHttpClientTransportConfig},
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    logging::LogManager,
    types::{CallError, ConnectionError},
};

use super::{
    http::build_http_client,
    session::{ProviderConnector, ProviderSession, RemoteOperation},
    stdio::build_stdio_command,
};

/// Connects to providers speaking the Model Context Protocol.
#[derive(Debug, Clone)]
pub struct RmcpConnector {
    /// Receives subprocess stderr lines.
    log_manager: Arc<LogManager>,
}

impl RmcpConnector {
    pub fn new(log_manager: Arc<LogManager>) -> Self {
        Self { log_manager }
    }

    /// Connect via stdio using a spawned child process.
    async fn connect_stdio(&self, provider: &str, launch: &LaunchSpec) -> Result<RunningService<RoleClient, ()>, ConnectionError> {
        let LaunchSpec::Subprocess { command, args, env, cwd } = launch else {
            return Err(ConnectionError::startup_failed(provider, "expected a subprocess launch spec"));
        };
        let command = build_stdio_command(command, args, env, cwd.as_ref());
        let (transport, stderr) = TokioChildProcess::builder(command)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| ConnectionError::startup_failed(provider, error.to_string()))?;

        if let Some(stderr) = stderr {
            self.log_manager.spawn_stderr_logger(provider.to_string(), stderr);
        }

        ().serve(transport)
            .await
            .map_err(|error| ConnectionError::handshake(provider, error.to_string()))
    }

    /// Connect via Streamable HTTP using rmcp's reqwest transport.
    async fn connect_http(&self, provider: &str, launch: &LaunchSpec) -> Result<RunningService<RoleClient, ()>, ConnectionError> {
        let LaunchSpec::Network {
            base_url,
            timeout_secs,
            headers,
            ..
        } = launch
        else {
            return Err(ConnectionError::startup_failed(provider, "expected a network launch spec"));
        };
        let http_client = build_http_client(headers, Duration::from_secs(*timeout_secs))
            .map_err(|error| ConnectionError::startup_failed(provider, error.to_string()))?;
        let config = StreamableHttpClientTransportConfig::with_uri(base_url.as_str().to_string());
        let transport = StreamableHttpClientTransport::with_client(http_client, config);

        ().serve(transport)
            .await
            .map_err(|error| ConnectionError::handshake(provider, error.to_string()))
    }
}

#[async_trait]
impl ProviderConnector for RmcpConnector {
    async fn connect(&self, provider: &str, launch: &LaunchSpec) -> Result<Arc<dyn ProviderSession>, ConnectionError> {
        let service = match launch {
            LaunchSpec::Subprocess { .. } => self.connect_stdio(provider, launch).await?,
            LaunchSpec::Network { .. } => self.connect_http(provider, launch).await?,
        };
        debug!(provider = %provider, transport = %launch.transport(), "provider handshake complete");
        Ok(Arc::new(RmcpSession::new(provider, service)))
    }
}

/// A running rmcp client service.
pub struct RmcpSession {
    provider: String,
    peer: Peer<RoleClient>,
    /// Held only so the session can be cancelled on close.
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl RmcpSession {
    pub fn new(provider: impl Into<String>, service: RunningService<RoleClient, ()>) -> Self {
        Self {
            provider: provider.into(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }

    async fn ensure_open(&self) -> Result<(), CallError> {
        if self.service.lock().await.is_none() {
            return Err(CallError::transport(format!("session to '{}' is closed", self.provider)));
        }
        Ok(())
    }
}

fn map_service_error(operation: &str, error: ServiceError) -> CallError {
    match error {
        ServiceError::McpError(data) => CallError::operation(operation, data.message.to_string()),
        other => CallError::transport(other.to_string()),
    }
}

#[async_trait]
impl ProviderSession for RmcpSession {
    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, CallError> {
        self.ensure_open().await?;
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|error| map_service_error("tools/list", error))?;

        Ok(tools
            .into_iter()
            .map(|tool| RemoteOperation {
                name: tool.name.to_string(),
                description: tool.description.as_ref().map(|description| description.to_string()),
                input_schema: Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn call(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, CallError> {
        self.ensure_open().await?;
        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                name: operation.to_string().into(),
                arguments: Some(arguments.clone()),
                task: None,
                meta: None,
            })
            .await
            .map_err(|error| map_service_error(operation, error))?;

        serde_json::to_value(result).map_err(|error| CallError::operation(operation, format!("unreadable result: {error}")))
    }

    async fn ping(&self) -> Result<(), CallError> {
        self.ensure_open().await?;
        self.peer
            .list_tools(Default::default())
            .await
            .map(|_| ())
            .map_err(|error| map_service_error("ping", error))
    }

    async fn close(&self) {
        if let Some(running) = self.service.lock().await.take() {
            let _ = running.cancel().await;
            debug!(provider = %self.provider, "provider session closed");
        }
    }
}
