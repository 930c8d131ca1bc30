//! Workflow step executor.
//!
//! Steps run strictly one after another: each step's input may depend on an earlier result, and
//! every outcome is persisted before the next step starts. Step failures are recorded and the
//! workflow moves on; only the terminal status reflects whether a side-effecting step failed.
//!
//! - `events::EventSink` delivers progress events to an optional observer
//! - `step` runs a single step: derive input, acquire, resolve, call, classify

mod events;
mod step;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use relay_mcp::{
    ConnectionManager, CredentialInjector, CredentialStore, LogManager, ProviderConnector, ProviderRegistry, RetryPolicy, SchemaAdapter,
    SchemaCatalog, TextGenerator,
};
use relay_types::{ExecutionEvent, ExecutionStatus, StepResult, StepTarget, WorkflowExecutionResult, WorkflowStatus, WorkflowStep};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classify::is_critical_operation;
use crate::derive::StepDeriver;
use crate::preflight::PreflightGate;
use crate::report::ExecutionReporter;
use crate::store::{ExecutionStore, StoreError};

pub use events::EventSink;

/// Error message recorded for steps skipped after cancellation.
pub const CANCELLED_MESSAGE: &str = "execution cancelled";

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorOptions {
    /// Maximum attempts per remote call.
    pub retry_attempts: u32,
    /// Backoff unit; attempt `k` waits `unit * 2^k` before retrying.
    pub backoff_unit: Duration,
    /// Per-call timeout for subprocess providers.
    pub call_timeout: Duration,
    /// Upper bound on any single text-generation request.
    pub generator_timeout: Duration,
    /// Refuse workflows whose providers lack verified credentials.
    pub preflight: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            call_timeout: Duration::from_secs(30),
            generator_timeout: Duration::from_secs(20),
            preflight: true,
        }
    }
}

impl ExecutorOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.backoff_unit)
    }

    /// Connection manager configured with these retry and timeout settings.
    pub fn connection_manager(&self, connector: Arc<dyn ProviderConnector>, log_manager: Arc<LogManager>) -> ConnectionManager {
        ConnectionManager::new(connector, log_manager)
            .with_retry_policy(self.retry_policy())
            .with_call_timeout(self.call_timeout)
    }
}

/// Process-wide collaborators the executor is built from.
#[derive(Clone)]
pub struct ExecutorServices {
    pub registry: Arc<ProviderRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub credentials: Arc<dyn CredentialStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn ExecutionStore>,
}

/// One workflow run requested by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub execution_id: String,
    pub user_id: String,
    pub steps: Vec<WorkflowStep>,
    /// Bypass the credential gate; reserved for trusted internal callers.
    pub skip_auth_check: bool,
}

impl ExecutionRequest {
    pub fn new(user_id: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            execution_id: new_execution_id(),
            user_id: user_id.into(),
            steps,
            skip_auth_check: false,
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn skip_auth_check(mut self, skip: bool) -> Self {
        self.skip_auth_check = skip;
        self
    }
}

fn new_execution_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "exec-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Failures that prevent an execution from producing a trustworthy trace.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("could not persist execution '{execution_id}': {source}")]
    Persistence {
        execution_id: String,
        #[source]
        source: StoreError,
    },
}

/// Drives workflows against providers.
pub struct WorkflowExecutor {
    registry: Arc<ProviderRegistry>,
    connections: Arc<ConnectionManager>,
    injector: CredentialInjector,
    adapter: SchemaAdapter,
    gate: PreflightGate,
    deriver: StepDeriver,
    reporter: ExecutionReporter,
    store: Arc<dyn ExecutionStore>,
    options: ExecutorOptions,
}

impl WorkflowExecutor {
    pub fn new(services: ExecutorServices, options: ExecutorOptions) -> Self {
        let ExecutorServices {
            registry,
            connections,
            credentials,
            generator,
            store,
        } = services;
        let injector = CredentialInjector::new(credentials);
        Self {
            adapter: SchemaAdapter::new(Arc::clone(&registry), Arc::clone(&generator)).with_generator_timeout(options.generator_timeout),
            gate: PreflightGate::new(Arc::clone(&registry), injector.clone()),
            deriver: StepDeriver::new(Arc::clone(&generator), options.generator_timeout),
            reporter: ExecutionReporter::new(generator, options.generator_timeout),
            registry,
            connections,
            injector,
            store,
            options,
        }
    }

    /// Share an operation-schema cache with other executors in the process.
    pub fn with_schema_catalog(mut self, catalog: Arc<SchemaCatalog>) -> Self {
        self.adapter = self.adapter.with_catalog(catalog);
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn preflight(&self) -> &PreflightGate {
        &self.gate
    }

    /// Run `request` to completion and return its full trace.
    ///
    /// Step failures never surface as `Err`; they are recorded in the trace and reflected in the
    /// status. `Err` means the workflow was malformed or the trace could not be persisted.
    /// Cancelling `cancel` stops new steps from starting; a call already in flight finishes or
    /// times out on its own.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        events: Option<UnboundedSender<ExecutionEvent>>,
        cancel: CancellationToken,
    ) -> Result<WorkflowExecutionResult, ExecutionError> {
        let events = EventSink::new(events);
        let steps = ordered_steps(&request.steps)?;
        let execution_id = request.execution_id.as_str();

        info!(execution_id, user = %request.user_id, steps = steps.len(), "starting workflow execution");
        events.emit(ExecutionEvent::ExecutionStart {
            execution_id: execution_id.to_string(),
            total_steps: steps.len(),
            at: Utc::now(),
        });
        self.persist(execution_id, self.store.update_status(execution_id, ExecutionStatus::Running).await)?;

        if self.options.preflight && !request.skip_auth_check {
            events.emit(ExecutionEvent::StatusUpdate {
                message: "Checking provider credentials".to_string(),
            });
            let missing = self.gate.missing_credentials(&steps, &request.user_id).await;
            if !missing.is_empty() {
                let message = format!("missing verified credentials for: {}", missing.join(", "));
                warn!(execution_id, providers = ?missing, "workflow refused before execution");
                events.emit(ExecutionEvent::Error { message: message.clone() });
                let result = WorkflowExecutionResult {
                    execution_id: execution_id.to_string(),
                    status: WorkflowStatus::Failed,
                    steps: Vec::new(),
                    final_result: None,
                    summary: None,
                    error: Some(message),
                };
                return self.finish(result, &events).await;
            }
        }

        let mut records: Vec<StepResult> = Vec::with_capacity(steps.len());
        let mut cancelled = false;
        for step in &steps {
            let record = if cancel.is_cancelled() {
                cancelled = true;
                StepResult {
                    critical: matches!(&step.target, StepTarget::Operation(name) if is_critical_operation(name)),
                    ..StepResult::failed(step.step_number, &step.provider_name, CANCELLED_MESSAGE)
                }
            } else {
                events.emit(ExecutionEvent::StepStart {
                    step_number: step.step_number,
                    provider: step.provider_name.clone(),
                    target: step.target.to_string(),
                    at: Utc::now(),
                });
                self.run_step(step, &request.user_id, &records).await
            };

            self.persist(execution_id, self.store.save_step_result(execution_id, &record).await)?;
            events.emit(step_event(&record));
            records.push(record);
        }

        let status = if cancelled { WorkflowStatus::Failed } else { WorkflowStatus::from_steps(&records) };
        let final_result = records
            .iter()
            .rev()
            .find(|record| record.success)
            .and_then(|record| record.normalized_result.clone());
        let summary = self.reporter.summarize(&records, status, &events).await;

        let result = WorkflowExecutionResult {
            execution_id: execution_id.to_string(),
            status,
            steps: records,
            final_result,
            summary: Some(summary),
            error: cancelled.then(|| CANCELLED_MESSAGE.to_string()),
        };
        self.finish(result, &events).await
    }

    async fn finish(&self, result: WorkflowExecutionResult, events: &EventSink) -> Result<WorkflowExecutionResult, ExecutionError> {
        let execution_id = result.execution_id.as_str();
        self.persist(execution_id, self.store.update_result(execution_id, &result).await)?;
        self.persist(execution_id, self.store.update_status(execution_id, result.status.into()).await)?;

        info!(execution_id, status = %result.status, steps = result.steps.len(), "workflow execution finished");
        events.emit(ExecutionEvent::WorkflowComplete {
            status: result.status,
            final_result: result.final_result.clone(),
        });
        events.emit(ExecutionEvent::TaskComplete {
            execution_id: execution_id.to_string(),
            status: result.status,
            finished_at: Utc::now(),
        });
        Ok(result)
    }

    fn persist(&self, execution_id: &str, outcome: Result<(), StoreError>) -> Result<(), ExecutionError> {
        outcome.map_err(|source| ExecutionError::Persistence {
            execution_id: execution_id.to_string(),
            source,
        })
    }
}

/// Steps in execution order. Step numbers must be exactly `1..=n`.
fn ordered_steps(steps: &[WorkflowStep]) -> Result<Vec<WorkflowStep>, ExecutionError> {
    let mut ordered = steps.to_vec();
    ordered.sort_by_key(|step| step.step_number);
    for (index, step) in ordered.iter().enumerate() {
        let expected = index as u32 + 1;
        if step.step_number != expected {
            return Err(ExecutionError::InvalidWorkflow(format!(
                "step numbers must run 1..={} without gaps or duplicates; found {} where {expected} was expected",
                steps.len(),
                step.step_number
            )));
        }
    }
    Ok(ordered)
}

fn step_event(record: &StepResult) -> ExecutionEvent {
    if record.success {
        ExecutionEvent::StepComplete {
            step_number: record.step_number,
            provider: record.provider_name.clone(),
            operation: record.operation_name.clone().unwrap_or_default(),
            result: record.normalized_result.clone().unwrap_or_default(),
            duration_ms: record.duration_ms,
        }
    } else {
        ExecutionEvent::StepError {
            step_number: record.step_number,
            provider: record.provider_name.clone(),
            error: record.error_message.clone().unwrap_or_default(),
            critical: record.critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_are_ordered_by_number() {
        let steps = vec![
            WorkflowStep::operation(2, "social", "publish_post", json!({})),
            WorkflowStep::operation(1, "prices", "get_price", json!({})),
        ];
        let ordered = ordered_steps(&steps).expect("valid numbering");
        assert_eq!(ordered.iter().map(|step| step.step_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn gaps_and_duplicates_are_rejected() {
        let gap = vec![
            WorkflowStep::operation(1, "prices", "get_price", json!({})),
            WorkflowStep::operation(3, "social", "publish_post", json!({})),
        ];
        assert!(matches!(ordered_steps(&gap), Err(ExecutionError::InvalidWorkflow(_))));

        let duplicate = vec![
            WorkflowStep::operation(1, "prices", "get_price", json!({})),
            WorkflowStep::operation(1, "social", "publish_post", json!({})),
        ];
        assert!(matches!(ordered_steps(&duplicate), Err(ExecutionError::InvalidWorkflow(_))));
        assert!(ordered_steps(&[]).expect("empty is valid").is_empty());
    }

    #[test]
    fn execution_ids_are_unique() {
        assert_ne!(new_execution_id(), new_execution_id());
    }

    #[test]
    fn default_options_match_documented_values() {
        let options = ExecutorOptions::default();
        assert_eq!(options.retry_policy().max_attempts, 3);
        assert_eq!(options.retry_policy().delay_for(1), Duration::from_secs(2));
        assert!(options.preflight);
    }
}
