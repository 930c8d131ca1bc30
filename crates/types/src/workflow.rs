//! Workflow steps, their recorded outcomes, and the aggregate execution result.
//!
//! A workflow is an ordered list of [`WorkflowStep`]s. Each step names a provider, either an
//! exact operation or a natural-language goal, and either a static input or a request to derive
//! its input from the previous step's result. Steps are immutable once loaded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a step asks the provider to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    /// Exact operation name (tolerant of hyphen/underscore variants).
    Operation(String),
    /// Natural-language objective resolved against the discovered operation list.
    Goal(String),
}

impl StepTarget {
    /// The operation name or goal text.
    pub fn as_str(&self) -> &str {
        match self {
            StepTarget::Operation(name) | StepTarget::Goal(name) => name,
        }
    }
}

impl std::fmt::Display for StepTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepTarget::Operation(name) => write!(f, "{name}"),
            StepTarget::Goal(goal) => write!(f, "goal: {goal}"),
        }
    }
}

/// Where a step's input comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// Used verbatim.
    Static(Value),
    /// Computed from the previous step's normalized result.
    DeriveFromPrevious,
}

/// One step in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflowStep", into = "RawWorkflowStep")]
pub struct WorkflowStep {
    /// 1-based position defining execution order.
    pub step_number: u32,
    pub provider_name: String,
    pub target: StepTarget,
    pub input: StepInput,
}

impl WorkflowStep {
    /// Step invoking an exact operation with static input.
    pub fn operation(step_number: u32, provider_name: impl Into<String>, operation: impl Into<String>, input: Value) -> Self {
        Self {
            step_number,
            provider_name: provider_name.into(),
            target: StepTarget::Operation(operation.into()),
            input: StepInput::Static(input),
        }
    }

    /// Step resolving a goal whose input is derived from the previous result.
    pub fn derived_goal(step_number: u32, provider_name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            step_number,
            provider_name: provider_name.into(),
            target: StepTarget::Goal(goal.into()),
            input: StepInput::DeriveFromPrevious,
        }
    }
}

/// Authoring shape of a step in YAML/JSON workflow documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkflowStep {
    #[serde(alias = "step")]
    step_number: u32,
    #[serde(alias = "provider")]
    provider_name: String,
    #[serde(default, alias = "op", skip_serializing_if = "Option::is_none")]
    operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    derive: bool,
}

impl TryFrom<RawWorkflowStep> for WorkflowStep {
    type Error = String;

    fn try_from(raw: RawWorkflowStep) -> Result<Self, Self::Error> {
        if raw.step_number == 0 {
            return Err("step numbers are 1-based".to_string());
        }
        let target = match (raw.operation, raw.goal) {
            (Some(operation), None) => StepTarget::Operation(operation),
            (None, Some(goal)) => StepTarget::Goal(goal),
            (Some(_), Some(_)) => return Err(format!("step {} declares both an operation and a goal", raw.step_number)),
            (None, None) => return Err(format!("step {} needs an operation or a goal", raw.step_number)),
        };
        let input = match (raw.input, raw.derive) {
            (Some(_), true) => {
                return Err(format!(
                    "step {} declares a static input and asks to derive one",
                    raw.step_number
                ));
            }
            (Some(value), false) => StepInput::Static(value),
            (None, true) => StepInput::DeriveFromPrevious,
            (None, false) => StepInput::Static(Value::Object(Default::default())),
        };
        Ok(Self {
            step_number: raw.step_number,
            provider_name: raw.provider_name,
            target,
            input,
        })
    }
}

impl From<WorkflowStep> for RawWorkflowStep {
    fn from(step: WorkflowStep) -> Self {
        let (operation, goal) = match step.target {
            StepTarget::Operation(name) => (Some(name), None),
            StepTarget::Goal(goal) => (None, Some(goal)),
        };
        let (input, derive) = match step.input {
            StepInput::Static(value) => (Some(value), false),
            StepInput::DeriveFromPrevious => (None, true),
        };
        Self {
            step_number: step.step_number,
            provider_name: step.provider_name,
            operation,
            goal,
            input,
            derive,
        }
    }
}

/// A workflow file: a name plus its ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<WorkflowStep>,
}

/// Recorded outcome of one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_number: u32,
    pub provider_name: String,
    /// Resolved operation name, when resolution got that far.
    #[serde(default)]
    pub operation_name: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub raw_result: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub normalized_result: Option<Value>,
    /// Whether the operation has external side effects.
    #[serde(default)]
    pub critical: bool,
    /// Number of call attempts made (0 when the call was never issued).
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepResult {
    /// Failure record for a step that did not produce a provider result.
    pub fn failed(step_number: u32, provider_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            step_number,
            provider_name: provider_name.into(),
            operation_name: None,
            success: false,
            raw_result: None,
            error_message: Some(error_message.into()),
            normalized_result: None,
            critical: false,
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Terminal status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// No critical step failed and at least one step succeeded.
    Completed,
    /// A critical step failed, or the execution was refused or cancelled.
    Failed,
    /// Some non-critical steps failed.
    Partial,
}

impl WorkflowStatus {
    /// Derive the terminal status from the recorded step outcomes.
    pub fn from_steps(steps: &[StepResult]) -> Self {
        if steps.iter().any(|step| step.critical && !step.success) {
            WorkflowStatus::Failed
        } else if steps.iter().any(|step| step.success) && steps.iter().all(|step| step.success) {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Partial => "partial",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status recorded by the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Partial,
}

impl From<WorkflowStatus> for ExecutionStatus {
    fn from(status: WorkflowStatus) -> Self {
        match status {
            WorkflowStatus::Completed => ExecutionStatus::Completed,
            WorkflowStatus::Failed => ExecutionStatus::Failed,
            WorkflowStatus::Partial => ExecutionStatus::Partial,
        }
    }
}

/// Aggregate outcome of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub execution_id: String,
    pub status: WorkflowStatus,
    /// Ordered per-step trace.
    pub steps: Vec<StepResult>,
    /// Normalized result of the last successful step.
    #[serde(default)]
    pub final_result: Option<Value>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Workflow-level error (refused pre-flight, cancellation).
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(success: bool, critical: bool) -> StepResult {
        StepResult {
            success,
            critical,
            ..StepResult::failed(1, "p", "x")
        }
    }

    #[test]
    fn status_follows_critical_and_success_rules() {
        assert_eq!(
            WorkflowStatus::from_steps(&[outcome(true, true), outcome(true, false)]),
            WorkflowStatus::Completed
        );
        assert_eq!(
            WorkflowStatus::from_steps(&[outcome(false, true), outcome(true, false)]),
            WorkflowStatus::Failed
        );
        assert_eq!(
            WorkflowStatus::from_steps(&[outcome(true, true), outcome(false, false)]),
            WorkflowStatus::Partial
        );
        assert_eq!(WorkflowStatus::from_steps(&[outcome(false, false)]), WorkflowStatus::Partial);
        assert_eq!(WorkflowStatus::from_steps(&[]), WorkflowStatus::Partial);
    }

    #[test]
    fn steps_parse_from_yaml_authoring_shape() {
        let yaml = r#"
name: price-alert
steps:
  - step: 1
    provider: prices
    operation: get_price
    input:
      symbol: BTC
  - step: 2
    provider: social
    goal: post a price update
    derive: true
"#;
        let document: WorkflowDocument = serde_yaml::from_str(yaml).expect("parse workflow");

        assert_eq!(document.name.as_deref(), Some("price-alert"));
        assert_eq!(document.steps[0].target, StepTarget::Operation("get_price".into()));
        assert_eq!(document.steps[0].input, StepInput::Static(json!({"symbol": "BTC"})));
        assert_eq!(document.steps[1].target, StepTarget::Goal("post a price update".into()));
        assert_eq!(document.steps[1].input, StepInput::DeriveFromPrevious);
    }

    #[test]
    fn steps_reject_ambiguous_targets() {
        let error = serde_json::from_value::<WorkflowStep>(json!({
            "stepNumber": 1,
            "providerName": "weather",
            "operation": "get_forecast",
            "goal": "get the forecast"
        }))
        .expect_err("both target kinds are rejected");
        assert!(error.to_string().contains("both an operation and a goal"));
    }

    #[test]
    fn step_serializes_back_to_authoring_shape() {
        let step = WorkflowStep::derived_goal(2, "social", "post it");
        let value = serde_json::to_value(&step).expect("serialize step");
        assert_eq!(value, json!({"stepNumber": 2, "providerName": "social", "goal": "post it", "derive": true}));
    }
}
