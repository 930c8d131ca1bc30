//! Text-generation collaborator interface.
//!
//! Operation selection, step derivation and execution summaries ask a language model for text.
//! Every caller treats the answer as untrusted: slow, malformed or failed generations fall back to
//! local logic.

use async_trait::async_trait;

/// Produces free-form text for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn suggest(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Generator used when no model is configured; every request fails so fallbacks engage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTextGenerator;

#[async_trait]
impl TextGenerator for DisabledTextGenerator {
    async fn suggest(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("text generation is not configured")
    }
}
