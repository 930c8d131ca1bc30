//! Execution persistence.
//!
//! The executor records every step outcome through an [`ExecutionStore`] before it advances to
//! the next step, so a crash leaves an inspectable trail. Two backends ship with the engine: an
//! in-memory store for tests and embedding, and an append-only JSON-lines store with one file
//! per execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_types::{ExecutionStatus, StepResult, WorkflowExecutionResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors surfaced by execution stores. The executor treats every one of them as fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("step {step_number} of execution '{execution_id}' was recorded out of order")]
    OutOfOrder { execution_id: String, step_number: u32 },

    #[error("invalid execution id '{0}'")]
    InvalidExecutionId(String),
}

/// Persistence collaborator for workflow executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Append one step outcome.
    async fn save_step_result(&self, execution_id: &str, result: &StepResult) -> Result<(), StoreError>;

    /// Record the lifecycle status of an execution.
    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<(), StoreError>;

    /// Record the assembled outcome of an execution.
    async fn update_result(&self, execution_id: &str, result: &WorkflowExecutionResult) -> Result<(), StoreError>;
}

/// Everything recorded for one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionRecord {
    pub status: Option<ExecutionStatus>,
    pub steps: Vec<StepResult>,
    pub result: Option<WorkflowExecutionResult>,
}

/// Store keeping records in memory.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: Mutex<HashMap<String, ExecutionRecord>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded for `execution_id`.
    pub async fn record(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.records.lock().await.get(execution_id).cloned()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save_step_result(&self, execution_id: &str, result: &StepResult) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records.entry(execution_id.to_string()).or_default();
        ensure_next_step(execution_id, &record.steps, result)?;
        record.steps.push(result.clone());
        Ok(())
    }

    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.entry(execution_id.to_string()).or_default().status = Some(status);
        Ok(())
    }

    async fn update_result(&self, execution_id: &str, result: &WorkflowExecutionResult) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.entry(execution_id.to_string()).or_default().result = Some(result.clone());
        Ok(())
    }
}

fn ensure_next_step(execution_id: &str, recorded: &[StepResult], result: &StepResult) -> Result<(), StoreError> {
    let expected = recorded.last().map_or(1, |last| last.step_number + 1);
    if result.step_number != expected {
        return Err(StoreError::OutOfOrder {
            execution_id: execution_id.to_string(),
            step_number: result.step_number,
        });
    }
    Ok(())
}

/// One line of a JSON-lines execution file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEntry {
    Step { at: DateTime<Utc>, result: StepResult },
    Status { at: DateTime<Utc>, status: ExecutionStatus },
    Result { at: DateTime<Utc>, result: WorkflowExecutionResult },
}

/// Append-only store writing `<dir>/<execution_id>.jsonl`.
#[derive(Debug)]
pub struct JsonlExecutionStore {
    directory: PathBuf,
    /// Last step number written per execution, to keep step lines in order.
    last_steps: Mutex<HashMap<String, u32>>,
}

impl JsonlExecutionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            last_steps: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, execution_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !execution_id.is_empty()
            && execution_id
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.'))
            && !execution_id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidExecutionId(execution_id.to_string()));
        }
        Ok(self.directory.join(format!("{execution_id}.jsonl")))
    }

    async fn append(&self, execution_id: &str, entry: &StoreEntry) -> Result<(), StoreError> {
        let path = self.path_for(execution_id)?;
        tokio::fs::create_dir_all(&self.directory).await?;

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        debug!(path = %path.display(), "appended execution record");
        Ok(())
    }

    /// Read back every entry recorded for `execution_id`, in write order.
    pub async fn read_entries(&self, execution_id: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let path = self.path_for(execution_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl ExecutionStore for JsonlExecutionStore {
    async fn save_step_result(&self, execution_id: &str, result: &StepResult) -> Result<(), StoreError> {
        let mut last_steps = self.last_steps.lock().await;
        let expected = last_steps.get(execution_id).map_or(1, |last| last + 1);
        if result.step_number != expected {
            return Err(StoreError::OutOfOrder {
                execution_id: execution_id.to_string(),
                step_number: result.step_number,
            });
        }
        self.append(
            execution_id,
            &StoreEntry::Step {
                at: Utc::now(),
                result: result.clone(),
            },
        )
        .await?;
        last_steps.insert(execution_id.to_string(), result.step_number);
        Ok(())
    }

    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<(), StoreError> {
        self.append(execution_id, &StoreEntry::Status { at: Utc::now(), status }).await
    }

    async fn update_result(&self, execution_id: &str, result: &WorkflowExecutionResult) -> Result<(), StoreError> {
        self.append(
            execution_id,
            &StoreEntry::Result {
                at: Utc::now(),
                result: result.clone(),
            },
        )
        .await
    }
}
