//! Shared type definitions for the relay workspace.
//!
//! Everything in this crate is plain serde data: provider catalogue entries, discovered
//! operation schemas, workflow steps and their recorded outcomes, user credentials, and the
//! progress events streamed while a workflow runs. Behavior lives in `relay-mcp` and
//! `relay-engine`.

pub mod credential;
pub mod event;
pub mod provider;
pub mod workflow;

pub use credential::Credential;
pub use event::ExecutionEvent;
pub use provider::{LaunchSpec, OperationSchema, ParameterSpec, ParameterType, ProviderDescriptor, TransportKind};
pub use workflow::{
    ExecutionStatus, StepInput, StepResult, StepTarget, WorkflowDocument, WorkflowExecutionResult, WorkflowStatus, WorkflowStep,
};
