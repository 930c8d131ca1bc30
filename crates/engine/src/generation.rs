//! Text generation backed by an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub use relay_mcp::{DisabledTextGenerator, TextGenerator};

pub const LLM_ENDPOINT_ENV: &str = "RELAY_LLM_ENDPOINT";
pub const LLM_API_KEY_ENV: &str = "RELAY_LLM_API_KEY";
pub const LLM_MODEL_ENV: &str = "RELAY_LLM_MODEL";

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Generator calling `POST <endpoint>` with a single user message.
#[derive(Clone)]
pub struct HttpTextGenerator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for HttpTextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTextGenerator")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpTextGenerator {
    pub fn new(endpoint: Url, api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("could not build the text generation HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model: model.into(),
        })
    }

    /// Build a generator from `RELAY_LLM_*` environment variables; `None` when no endpoint is set.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(endpoint) = std::env::var(LLM_ENDPOINT_ENV).ok().filter(|value| !value.trim().is_empty()) else {
            return Ok(None);
        };
        let endpoint = Url::parse(endpoint.trim()).with_context(|| format!("{LLM_ENDPOINT_ENV} is not a valid URL"))?;
        let api_key = std::env::var(LLM_API_KEY_ENV).ok().filter(|value| !value.is_empty());
        let model = std::env::var(LLM_MODEL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(endpoint, api_key, model).map(Some)
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn suggest(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response: ChatResponse = request
            .send()
            .await
            .context("text generation request failed")?
            .error_for_status()
            .context("text generation endpoint returned an error")?
            .json()
            .await
            .context("text generation response was not valid JSON")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("text generation response contained no message"))
    }
}
