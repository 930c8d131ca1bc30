//! Connection state and health for providers.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Lifecycle state of a provider connection.
///
/// `Disconnected -> Connecting -> Connected -> (Degraded -> Connecting | Disconnected)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// A liveness probe failed; one reconnect attempt follows.
    Degraded,
}

impl ConnectionState {
    /// Get the display text for this state.
    pub fn display(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Degraded => "Degraded",
        }
    }

    /// Check if the provider currently has a usable session.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if the state is transitional.
    pub fn is_transitional(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Degraded)
    }
}

/// Health status of a provider connection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthStatus {
    /// Whether the provider is healthy.
    pub healthy: bool,

    /// Last health check time.
    pub last_check: Option<SystemTime>,

    /// Time the current connection was established.
    pub start_time: Option<SystemTime>,

    /// Handshake latency in milliseconds.
    pub handshake_latency: Option<u64>,

    /// Number of consecutive failures.
    pub failure_count: u32,

    /// Last error message.
    pub last_error: Option<String>,
}

impl HealthStatus {
    /// Create a new health status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the provider as healthy.
    pub fn mark_healthy(&mut self) {
        self.healthy = true;
        self.failure_count = 0;
        self.last_error = None;
        self.last_check = Some(SystemTime::now());
    }

    /// Mark the provider as unhealthy with an error.
    pub fn mark_unhealthy(&mut self, error: String) {
        self.healthy = false;
        self.failure_count += 1;
        self.last_error = Some(error);
        self.last_check = Some(SystemTime::now());
    }

    /// Record a fresh connection and its handshake latency.
    pub fn mark_connected(&mut self, handshake_latency: Duration) {
        self.mark_healthy();
        self.start_time = Some(SystemTime::now());
        self.handshake_latency = Some(handshake_latency.as_millis() as u64);
    }

    /// Check if the provider is healthy.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Get the uptime of the current connection.
    pub fn uptime(&self) -> Option<Duration> {
        self.start_time.map(|start| start.elapsed().unwrap_or_default())
    }
}

/// Snapshot of one provider's connection as reported by the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub state: ConnectionState,
    pub health: HealthStatus,
    /// Increments each time a new connection is established.
    pub generation: u64,
}
