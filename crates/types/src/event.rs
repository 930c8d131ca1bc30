//! Progress events streamed to an observer while a workflow executes.
//!
//! Events are fire-and-forget: the executor's correctness never depends on anyone consuming
//! them. The serialized form uses a snake_case `type` tag so it can be written directly to a
//! long-lived HTTP stream or a terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::WorkflowStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStart {
        execution_id: String,
        total_steps: usize,
        at: DateTime<Utc>,
    },
    StatusUpdate {
        message: String,
    },
    StepStart {
        step_number: u32,
        provider: String,
        target: String,
        at: DateTime<Utc>,
    },
    StepComplete {
        step_number: u32,
        provider: String,
        operation: String,
        result: Value,
        duration_ms: u64,
    },
    StepError {
        step_number: u32,
        provider: String,
        error: String,
        critical: bool,
    },
    GeneratingSummary,
    SummaryChunk {
        text: String,
    },
    WorkflowComplete {
        status: WorkflowStatus,
        final_result: Option<Value>,
    },
    TaskComplete {
        execution_id: String,
        status: WorkflowStatus,
        finished_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl ExecutionEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStart { .. } => "execution_start",
            ExecutionEvent::StatusUpdate { .. } => "status_update",
            ExecutionEvent::StepStart { .. } => "step_start",
            ExecutionEvent::StepComplete { .. } => "step_complete",
            ExecutionEvent::StepError { .. } => "step_error",
            ExecutionEvent::GeneratingSummary => "generating_summary",
            ExecutionEvent::SummaryChunk { .. } => "summary_chunk",
            ExecutionEvent::WorkflowComplete { .. } => "workflow_complete",
            ExecutionEvent::TaskComplete { .. } => "task_complete",
            ExecutionEvent::Error { .. } => "error",
        }
    }
}
