//! Step derivation: turning one step's output into the next step's input.

use std::sync::Arc;
use std::time::Duration;

use relay_mcp::TextGenerator;
use relay_types::StepResult;
use relay_util::parse_embedded_json;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Asks the text generator to reshape a previous result for the next step's goal.
///
/// Any generator failure, timeout or empty answer falls back to the previous result unchanged.
#[derive(Clone)]
pub struct StepDeriver {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl StepDeriver {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Input for a step pursuing `goal`, derived from `previous`.
    pub async fn derive(&self, goal: &str, previous: &Value) -> Value {
        let prompt = derivation_prompt(goal, previous);
        let answer = match timeout(self.timeout, self.generator.suggest(&prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(error)) => {
                warn!(error = %error, "derivation failed, passing previous result through");
                return previous.clone();
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "derivation timed out, passing previous result through");
                return previous.clone();
            }
        };

        let trimmed = answer.trim();
        if trimmed.is_empty() {
            warn!("derivation returned nothing, passing previous result through");
            return previous.clone();
        }
        let derived = parse_embedded_json(trimmed).unwrap_or_else(|| Value::String(trimmed.to_string()));
        debug!(goal = %goal, "derived step input");
        derived
    }
}

/// Value the next derived step starts from: the most recent successful normalized result.
pub fn previous_result(records: &[StepResult]) -> Value {
    records
        .iter()
        .rev()
        .find(|record| record.success)
        .and_then(|record| record.normalized_result.clone())
        .unwrap_or(Value::Null)
}

fn derivation_prompt(goal: &str, previous: &Value) -> String {
    let previous = match previous {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    format!(
        "Transform the output of the previous workflow step into the input for the next step.\n\
         Next step goal: {goal}\n\
         Previous output: {previous}\n\
         Respond with only the new input: a JSON object of parameters, or plain text if a single value is enough."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed(anyhow::Result<String>);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn suggest(&self, _prompt: &str) -> anyhow::Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(error) => Err(anyhow::anyhow!(error.to_string())),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl TextGenerator for Stalled {
        async fn suggest(&self, _prompt: &str) -> anyhow::Result<String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn deriver(generator: impl TextGenerator + 'static) -> StepDeriver {
        StepDeriver::new(Arc::new(generator), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn json_answers_become_structured_input() {
        let derived = deriver(Fixed(Ok("```json\n{\"message\": \"BTC is at 42\"}\n```".into())))
            .derive("post a price update", &json!({"price": 42}))
            .await;
        assert_eq!(derived, json!({"message": "BTC is at 42"}));
    }

    #[tokio::test]
    async fn plain_answers_become_text_input() {
        let derived = deriver(Fixed(Ok("  Bitcoin just hit 42!  ".into())))
            .derive("post a price update", &json!({"price": 42}))
            .await;
        assert_eq!(derived, json!("Bitcoin just hit 42!"));
    }

    #[tokio::test]
    async fn failures_pass_previous_result_through() {
        let previous = json!({"price": 42});
        assert_eq!(deriver(Fixed(Err(anyhow::anyhow!("boom")))).derive("x", &previous).await, previous);
        assert_eq!(deriver(Fixed(Ok("   ".into()))).derive("x", &previous).await, previous);
        assert_eq!(deriver(Stalled).derive("x", &previous).await, previous);
    }

    #[test]
    fn previous_result_skips_failed_steps() {
        let ok = StepResult {
            success: true,
            normalized_result: Some(json!("sunny")),
            ..StepResult::failed(1, "weather", "")
        };
        let failed = StepResult::failed(2, "social", "forbidden");

        assert_eq!(previous_result(&[ok, failed]), json!("sunny"));
        assert_eq!(previous_result(&[]), Value::Null);
    }
}
