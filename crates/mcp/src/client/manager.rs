//! ConnectionManager: live provider sessions, acquisition and calls.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use relay_types::LaunchSpec;
use serde_json::{Map, Value};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    logging::LogManager,
    types::{CallError, ConnectionError, ConnectionState, HealthStatus, LogLevel, ProviderLogEntry, ProviderStatus},
};

use super::{
    retry::RetryPolicy,
    session::{ProviderConnector, ProviderSession},
};

/// Maximum amount of time to wait for a single operation call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A provider session as handed to one caller. Callers request a fresh handle per step.
#[derive(Clone)]
pub struct ProviderHandle {
    provider: String,
    /// Connection generation; changes whenever the provider reconnects.
    generation: u64,
    session: Arc<dyn ProviderSession>,
    /// Launch parameters the session was acquired with; used to reconnect between retries.
    launch: Option<LaunchSpec>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ProviderHandle {
    /// Wrap a session that is not tracked by a [`ConnectionManager`], using the default retry
    /// policy and call timeout.
    pub fn detached(provider: impl Into<String>, generation: u64, session: Arc<dyn ProviderSession>) -> Self {
        Self {
            provider: provider.into(),
            generation,
            session,
            launch: None,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> &Arc<dyn ProviderSession> {
        &self.session
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("provider", &self.provider)
            .field("generation", &self.generation)
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Result of a call together with the number of attempts it took.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: Result<Value, CallError>,
    pub attempts: u32,
}

#[derive(Default)]
struct SlotState {
    state: ConnectionState,
    session: Option<Arc<dyn ProviderSession>>,
    /// Launch parameters of the most recent connection sequence, credentials included.
    launch: Option<LaunchSpec>,
    generation: u64,
    health: HealthStatus,
    /// Outcome of the most recent connection sequence, shared with callers that waited on it.
    last_outcome: Option<Result<ProviderHandle, ConnectionError>>,
}

/// Per-provider record. Holding `state` is the only way to (re)connect the provider.
#[derive(Default)]
struct ProviderSlot {
    state: Mutex<SlotState>,
    /// Bumped after every connection sequence.
    epoch: AtomicU64,
}

/// Owns live connections to providers.
pub struct ConnectionManager {
    connector: Arc<dyn ProviderConnector>,
    log_manager: Arc<LogManager>,
    slots: Mutex<HashMap<String, Arc<ProviderSlot>>>,
    retry: RetryPolicy,
    call_timeout: Duration,
    connect_timeout: Duration,
    probe_timeout: Duration,
    shut_down: AtomicBool,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn ProviderConnector>, log_manager: Arc<LogManager>) -> Self {
        Self {
            connector,
            log_manager,
            slots: Mutex::new(HashMap::new()),
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Per-call timeout for subprocess providers; network providers use their configured value.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Access the log manager receiving provider output.
    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }

    async fn slot(&self, provider: &str) -> Arc<ProviderSlot> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(provider.to_string()).or_default())
    }

    /// Return a live handle for `provider`, connecting if needed.
    ///
    /// An existing connection is probed first; if the probe fails the connection is torn down
    /// and exactly one reconnect is attempted. A connection opened with different launch
    /// parameters (another user's credentials) is never handed out; it is replaced instead.
    /// Concurrent callers with the same launch parameters share a single connection sequence and
    /// all receive its handle or its error.
    pub async fn acquire(&self, provider: &str, launch: &LaunchSpec) -> Result<ProviderHandle, ConnectionError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ConnectionError::ShutDown);
        }

        let slot = self.slot(provider).await;
        let observed_epoch = slot.epoch.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        let same_launch = state.launch.as_ref() == Some(launch);
        if slot.epoch.load(Ordering::Acquire) != observed_epoch
            && same_launch
            && let Some(outcome) = state.last_outcome.clone()
        {
            debug!(provider = %provider, "joining connection sequence that completed while waiting");
            return outcome;
        }

        let Some(session) = state.session.clone() else {
            let outcome = self.establish(provider, launch, &mut state).await;
            return self.finish(&slot, &mut state, outcome);
        };

        if !same_launch {
            info!(provider = %provider, "launch parameters changed, replacing connection");
            self.log_manager
                .add_system_log(provider, LogLevel::Info, "launch parameters changed, reconnecting".to_string())
                .await;
            session.close().await;
            state.session = None;
            let outcome = self.establish(provider, launch, &mut state).await;
            return self.finish(&slot, &mut state, outcome);
        }

        let probe = match timeout(self.probe_timeout, session.ping()).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout {
                operation: "ping".to_string(),
                timeout: self.probe_timeout,
            }),
        };
        match probe {
            Ok(()) => {
                state.state = ConnectionState::Connected;
                state.health.mark_healthy();
                Ok(self.handle(provider, state.generation, session, launch))
            }
            Err(error) => {
                warn!(provider = %provider, error = %error, "liveness probe failed, reconnecting");
                state.state = ConnectionState::Degraded;
                state.health.mark_unhealthy(error.to_string());
                self.log_manager
                    .add_system_log(provider, LogLevel::Warn, format!("liveness probe failed: {error}"))
                    .await;
                session.close().await;
                state.session = None;

                let outcome = self
                    .establish(provider, launch, &mut state)
                    .await
                    .map_err(|error| ConnectionError::Unreachable {
                        name: provider.to_string(),
                        reason: error.to_string(),
                    });
                self.finish(&slot, &mut state, outcome)
            }
        }
    }

    async fn establish(&self, provider: &str, launch: &LaunchSpec, state: &mut SlotState) -> Result<ProviderHandle, ConnectionError> {
        state.state = ConnectionState::Connecting;
        state.launch = Some(launch.clone());
        let started = Instant::now();
        info!(provider = %provider, transport = %launch.transport(), "connecting to provider");

        let connected = match timeout(self.connect_timeout, self.connector.connect(provider, launch)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::handshake(
                provider,
                format!("timed out after {:?}", self.connect_timeout),
            )),
        };

        match connected {
            Ok(session) => {
                state.generation += 1;
                state.state = ConnectionState::Connected;
                state.health.mark_connected(started.elapsed());
                state.session = Some(Arc::clone(&session));
                self.log_manager
                    .add_system_log(provider, LogLevel::Info, format!("connected (generation {})", state.generation))
                    .await;
                Ok(self.handle(provider, state.generation, session, launch))
            }
            Err(error) => {
                warn!(provider = %provider, error = %error, "provider connection failed");
                state.state = ConnectionState::Disconnected;
                state.health.mark_unhealthy(error.to_string());
                self.log_manager
                    .add_system_log(provider, LogLevel::Error, error.to_string())
                    .await;
                Err(error)
            }
        }
    }

    fn finish(
        &self,
        slot: &ProviderSlot,
        state: &mut SlotState,
        outcome: Result<ProviderHandle, ConnectionError>,
    ) -> Result<ProviderHandle, ConnectionError> {
        state.last_outcome = Some(outcome.clone());
        slot.epoch.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    fn handle(&self, provider: &str, generation: u64, session: Arc<dyn ProviderSession>, launch: &LaunchSpec) -> ProviderHandle {
        let (retry, call_timeout) = match launch {
            LaunchSpec::Network { timeout_secs, retries, .. } => {
                (self.retry.with_max_attempts(*retries), Duration::from_secs(*timeout_secs))
            }
            LaunchSpec::Subprocess { .. } => (self.retry, self.call_timeout),
        };
        ProviderHandle {
            provider: provider.to_string(),
            generation,
            session,
            launch: Some(launch.clone()),
            retry,
            call_timeout,
        }
    }

    /// Invoke `operation` on the handle's provider.
    ///
    /// Transport failures and timeouts are retried with exponential backoff until the
    /// handle's attempt budget is spent; operation errors reported by the provider are returned
    /// immediately. Before each retry the connection is probed and, if dead, re-established
    /// with the handle's launch parameters.
    pub async fn call(&self, handle: &ProviderHandle, operation: &str, arguments: &Map<String, Value>) -> CallOutcome {
        let mut session = Arc::clone(&handle.session);
        let mut attempt = 0;
        loop {
            let result = match timeout(handle.call_timeout, session.call(operation, arguments)).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout {
                    operation: operation.to_string(),
                    timeout: handle.call_timeout,
                }),
            };
            attempt += 1;

            let error = match result {
                Ok(value) => {
                    return CallOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };
            if !error.is_retryable() {
                return CallOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            self.record_call_failure(&handle.provider, &error).await;
            if attempt >= handle.retry.max_attempts {
                warn!(provider = %handle.provider, operation = %operation, attempts = attempt, error = %error, "call failed after exhausting retries");
                return CallOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            let delay = handle.retry.delay_for(attempt - 1);
            warn!(provider = %handle.provider, operation = %operation, attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying call");
            tokio::time::sleep(delay).await;

            if let Some(launch) = &handle.launch {
                match self.acquire(&handle.provider, launch).await {
                    Ok(current) => session = current.session,
                    Err(error) => {
                        warn!(provider = %handle.provider, error = %error, "reconnect before retry failed");
                    }
                }
            }
        }
    }

    async fn record_call_failure(&self, provider: &str, error: &CallError) {
        let slot = self.slot(provider).await;
        let mut state = slot.state.lock().await;
        if state.state == ConnectionState::Connected {
            state.state = ConnectionState::Degraded;
        }
        state.health.mark_unhealthy(error.to_string());
    }

    /// Tear down the provider's connection, terminating subprocess providers.
    pub async fn disconnect(&self, provider: &str) {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(provider).cloned()
        };
        let Some(slot) = slot else {
            return;
        };
        let mut state = slot.state.lock().await;
        if let Some(session) = state.session.take() {
            session.close().await;
            info!(provider = %provider, "provider disconnected");
        }
        state.state = ConnectionState::Disconnected;
        state.last_outcome = None;
        state.health.mark_unhealthy("Disconnected".to_string());
    }

    /// Disconnect every provider and refuse further acquisitions.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let names: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }

    /// Connection snapshot for one provider, if it was ever acquired.
    pub async fn status(&self, provider: &str) -> Option<ProviderStatus> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(provider).cloned()
        }?;
        let state = slot.state.lock().await;
        Some(ProviderStatus {
            provider: provider.to_string(),
            state: state.state,
            health: state.health.clone(),
            generation: state.generation,
        })
    }

    /// Snapshots for every provider ever acquired.
    pub async fn statuses(&self) -> Vec<ProviderStatus> {
        let names: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        let mut statuses = Vec::with_capacity(names.len());
        for name in names {
            if let Some(status) = self.status(&name).await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Most recent captured log lines for `provider`, redacted.
    pub async fn recent_logs(&self, provider: &str, count: usize) -> Vec<ProviderLogEntry> {
        self.log_manager.get_recent_logs(provider, count).await
    }
}
