//! Pre-flight credential gate.

use std::sync::Arc;

use indexmap::IndexSet;
use relay_mcp::{CredentialInjector, ProviderRegistry};
use relay_types::WorkflowStep;
use tracing::debug;

/// Refuses workflows whose providers need credentials the user does not have.
#[derive(Clone)]
pub struct PreflightGate {
    registry: Arc<ProviderRegistry>,
    injector: CredentialInjector,
}

impl PreflightGate {
    pub fn new(registry: Arc<ProviderRegistry>, injector: CredentialInjector) -> Self {
        Self { registry, injector }
    }

    /// Canonical names of providers used by `steps` that require authorization `user_id` lacks.
    ///
    /// Providers that are not configured are skipped here; their steps fail on their own.
    pub async fn missing_credentials(&self, steps: &[WorkflowStep], user_id: &str) -> Vec<String> {
        let providers: IndexSet<&str> = steps.iter().map(|step| self.registry.resolve_alias(&step.provider_name)).collect();

        let mut missing = Vec::new();
        for provider in providers {
            let Ok(descriptor) = self.registry.lookup(provider) else {
                continue;
            };
            if !self.injector.has_required_credentials(descriptor, user_id).await {
                debug!(provider = %descriptor.name, "missing verified credential");
                missing.push(descriptor.name.clone());
            }
        }
        missing
    }

    /// Whether every provider in `steps` that requires authorization has a verified credential.
    pub async fn is_every_required_credential_verified(&self, steps: &[WorkflowStep], user_id: &str) -> bool {
        self.missing_credentials(steps, user_id).await.is_empty()
    }
}
