//! Execution reporter: narrative summaries streamed as events.

use std::sync::Arc;
use std::time::Duration;

use relay_mcp::TextGenerator;
use relay_types::{ExecutionEvent, StepResult, WorkflowStatus};
use relay_util::redact_sensitive;
use serde_json::Value;
use tokio::time::timeout;
use tracing::warn;

use crate::executor::EventSink;

const SUMMARY_CHUNK_WIDTH: usize = 80;
const MAX_PROMPT_RESULT_CHARS: usize = 400;

/// Produces the human-readable summary of an execution.
#[derive(Clone)]
pub struct ExecutionReporter {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl ExecutionReporter {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Summarize `steps` and stream the summary to `events` in wrapped chunks.
    ///
    /// The text generator narrates when it can; otherwise a local summary is built from the trace.
    pub async fn summarize(&self, steps: &[StepResult], status: WorkflowStatus, events: &EventSink) -> String {
        events.emit(ExecutionEvent::GeneratingSummary);

        let prompt = summary_prompt(steps, status);
        let summary = match timeout(self.timeout, self.generator.suggest(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => redact_sensitive(text.trim()),
            Ok(Ok(_)) => local_summary(steps, status),
            Ok(Err(error)) => {
                warn!(error = %error, "summary generation failed, using local summary");
                local_summary(steps, status)
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "summary generation timed out, using local summary");
                local_summary(steps, status)
            }
        };

        for line in textwrap::wrap(&summary, SUMMARY_CHUNK_WIDTH) {
            events.emit(ExecutionEvent::SummaryChunk { text: line.into_owned() });
        }
        summary
    }
}

/// Summary built from the step trace alone.
pub fn local_summary(steps: &[StepResult], status: WorkflowStatus) -> String {
    let succeeded = steps.iter().filter(|step| step.success).count();
    let mut summary = format!("Workflow {status}: {succeeded} of {} steps succeeded.", steps.len());
    for step in steps.iter().filter(|step| !step.success) {
        let operation = step.operation_name.as_deref().unwrap_or("?");
        let error = step.error_message.as_deref().unwrap_or("unknown error");
        let marker = if step.critical { " (critical)" } else { "" };
        summary.push_str(&format!(
            "\nStep {} {}/{}{marker} failed: {}",
            step.step_number,
            step.provider_name,
            operation,
            redact_sensitive(error)
        ));
    }
    summary
}

fn summary_prompt(steps: &[StepResult], status: WorkflowStatus) -> String {
    let trace: Vec<String> = steps
        .iter()
        .map(|step| {
            let outcome = if step.success {
                let result = match &step.normalized_result {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                format!("succeeded: {}", truncate(&redact_sensitive(&result)))
            } else {
                format!("failed: {}", redact_sensitive(step.error_message.as_deref().unwrap_or("unknown error")))
            };
            format!(
                "{}. {}/{} {outcome}",
                step.step_number,
                step.provider_name,
                step.operation_name.as_deref().unwrap_or("?")
            )
        })
        .collect();

    format!(
        "Summarize this workflow execution for the user in two or three sentences.\n\
         Overall status: {status}\n\
         Steps:\n{}",
        trace.join("\n")
    )
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_PROMPT_RESULT_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_PROMPT_RESULT_CHARS).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_mcp::DisabledTextGenerator;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn trace() -> Vec<StepResult> {
        vec![
            StepResult {
                success: true,
                operation_name: Some("get_price".into()),
                normalized_result: Some(json!({"price": 42})),
                ..StepResult::failed(1, "prices", "")
            },
            StepResult {
                operation_name: Some("publish_post".into()),
                critical: true,
                ..StepResult::failed(2, "social", "forbidden")
            },
        ]
    }

    #[test]
    fn local_summary_lists_failures() {
        let summary = local_summary(&trace(), WorkflowStatus::Failed);
        assert_eq!(
            summary,
            "Workflow failed: 1 of 2 steps succeeded.\nStep 2 social/publish_post (critical) failed: forbidden"
        );
    }

    #[tokio::test]
    async fn falls_back_to_local_summary_and_streams_chunks() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let reporter = ExecutionReporter::new(Arc::new(DisabledTextGenerator), Duration::from_secs(1));

        let summary = reporter
            .summarize(&trace(), WorkflowStatus::Failed, &EventSink::new(Some(sender)))
            .await;

        assert!(summary.starts_with("Workflow failed"));
        assert_eq!(receiver.recv().await, Some(ExecutionEvent::GeneratingSummary));
        let mut streamed = Vec::new();
        while let Ok(ExecutionEvent::SummaryChunk { text }) = receiver.try_recv() {
            streamed.push(text);
        }
        assert!(!streamed.is_empty());
        assert!(streamed.iter().all(|chunk| chunk.chars().count() <= SUMMARY_CHUNK_WIDTH));
    }
}
