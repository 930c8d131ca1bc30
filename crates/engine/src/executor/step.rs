//! Single-step execution.

use std::time::Instant;

use relay_mcp::normalize_result;
use relay_types::{StepInput, StepResult, StepTarget, WorkflowStep};
use relay_util::redact_sensitive;
use tracing::{debug, info, warn};

use crate::classify::{classify_response, is_critical_operation};
use crate::derive::previous_result;

use super::WorkflowExecutor;

impl WorkflowExecutor {
    /// Run one step and return its record. Never fails: every error becomes a failed record.
    pub(super) async fn run_step(&self, step: &WorkflowStep, user_id: &str, previous: &[StepResult]) -> StepResult {
        let started = Instant::now();
        let mut record = StepResult {
            critical: matches!(&step.target, StepTarget::Operation(name) if is_critical_operation(name)),
            error_message: None,
            ..StepResult::failed(step.step_number, &step.provider_name, "")
        };

        match self.attempt(step, user_id, previous, &mut record).await {
            Ok(()) => {
                record.success = true;
                info!(
                    step = step.step_number,
                    provider = %step.provider_name,
                    operation = record.operation_name.as_deref().unwrap_or_default(),
                    attempts = record.attempts,
                    "step succeeded"
                );
            }
            Err(message) => {
                let message = redact_sensitive(&message);
                warn!(
                    step = step.step_number,
                    provider = %step.provider_name,
                    critical = record.critical,
                    error = %message,
                    "step failed"
                );
                record.success = false;
                record.error_message = Some(message);
            }
        }
        record.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        record
    }

    async fn attempt(&self, step: &WorkflowStep, user_id: &str, previous: &[StepResult], record: &mut StepResult) -> Result<(), String> {
        let input = match &step.input {
            StepInput::Static(value) => value.clone(),
            StepInput::DeriveFromPrevious => {
                debug!(step = step.step_number, "deriving input from previous result");
                self.deriver.derive(step.target.as_str(), &previous_result(previous)).await
            }
        };

        let descriptor = self.registry.lookup(&step.provider_name).map_err(|error| error.to_string())?;
        let launch = self.injector.resolve(descriptor, user_id).await;
        let handle = self
            .connections
            .acquire(&descriptor.name, &launch)
            .await
            .map_err(|error| error.to_string())?;

        let resolved = self
            .adapter
            .resolve_operation(descriptor, &handle, &step.target, input)
            .await
            .map_err(|error| error.to_string())?;
        let operation = resolved.schema.operation_name.as_str();
        record.operation_name = Some(operation.to_string());
        record.critical = is_critical_operation(operation);

        let outcome = self.connections.call(&handle, operation, &resolved.arguments).await;
        record.attempts = outcome.attempts;
        let raw = outcome.result.map_err(|error| error.to_string())?;

        let verdict = classify_response(&raw);
        if verdict.is_ok() {
            record.normalized_result = Some(normalize_result(&raw));
        }
        record.raw_result = Some(raw);
        verdict
    }
}
