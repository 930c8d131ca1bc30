//! # Relay Engine
//!
//! The Relay engine runs workflows: ordered steps, each invoking one operation on one tool
//! provider. It derives step inputs from earlier results, classifies provider answers, persists
//! every outcome before moving on, and narrates the result.
//!
//! ## Usage
//!
//! ```rust
//! use relay_engine::parse_workflow_str;
//!
//! let workflow = parse_workflow_str(r#"
//! name: weather-report
//! steps:
//!   - step: 1
//!     provider: weather
//!     operation: get_forecast
//!     input: { city: Paris }
//! "#)?;
//! assert_eq!(workflow.steps.len(), 1);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - **`executor`**: the sequential step loop, events and cancellation
//! - **`classify`**: application-error heuristic and critical-operation detection
//! - **`derive`**: step input derivation through the text generator
//! - **`preflight`**: credential gate run before any step
//! - **`report`**: execution summaries
//! - **`store`**: execution persistence backends
//! - **`generation`**: HTTP-backed text generator

use std::{fs, path::Path};

use anyhow::{Context, Result};
use relay_types::{WorkflowDocument, WorkflowStep};
use serde::Deserialize;

pub mod classify;
pub mod derive;
pub mod executor;
pub mod generation;
pub mod preflight;
pub mod report;
pub mod store;

pub use classify::{classify_response, is_critical_operation};
pub use executor::{
    CANCELLED_MESSAGE, EventSink, ExecutionError, ExecutionRequest, ExecutorOptions, ExecutorServices, WorkflowExecutor,
};
pub use generation::{DisabledTextGenerator, HttpTextGenerator, TextGenerator};
pub use preflight::PreflightGate;
pub use store::{ExecutionRecord, ExecutionStore, InMemoryExecutionStore, JsonlExecutionStore, StoreEntry, StoreError};

/// Parse a workflow from YAML or JSON text.
///
/// Accepts either `{ name, steps: [...] }` or a bare list of steps.
pub fn parse_workflow_str(content: &str) -> Result<WorkflowDocument> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Authored {
        Document(WorkflowDocument),
        Steps(Vec<WorkflowStep>),
    }

    let authored: Authored = serde_yaml::from_str(content).context("Unsupported workflow document format")?;
    Ok(match authored {
        Authored::Document(document) => document,
        Authored::Steps(steps) => WorkflowDocument { name: None, steps },
    })
}

/// Load a workflow file from the filesystem.
pub fn parse_workflow_file(file_path: impl AsRef<Path>) -> Result<WorkflowDocument> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path.display()))?;
    let mut document = parse_workflow_str(&content).with_context(|| format!("Failed to parse workflow file: {}", file_path.display()))?;
    if document.name.is_none() {
        document.name = file_path.file_stem().map(|stem| stem.to_string_lossy().into_owned());
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::{StepInput, StepTarget};

    #[test]
    fn parses_bare_step_lists() {
        let document = parse_workflow_str(
            r#"[{"step": 1, "provider": "weather", "op": "get_forecast", "input": {"city": "Paris"}}]"#,
        )
        .expect("json list");
        assert_eq!(document.name, None);
        assert_eq!(document.steps[0].target, StepTarget::Operation("get_forecast".into()));
    }

    #[test]
    fn file_name_becomes_default_workflow_name() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let workflow_path = temp_dir.path().join("price-alert.yaml");
        fs::write(
            &workflow_path,
            "- step: 1\n  provider: prices\n  operation: get_price\n- step: 2\n  provider: social\n  goal: post a price update\n  derive: true\n",
        )
        .expect("write workflow");

        let document = parse_workflow_file(&workflow_path).expect("parse workflow");
        assert_eq!(document.name.as_deref(), Some("price-alert"));
        assert_eq!(document.steps[1].input, StepInput::DeriveFromPrevious);
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(parse_workflow_str("workflow: nothing here").is_err());
    }
}
