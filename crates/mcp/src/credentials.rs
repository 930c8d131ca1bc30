//! Credential lookup and injection into provider launch parameters.
//!
//! Secrets are merged into a copy of the descriptor's [`LaunchSpec`] that lives only for one
//! acquisition; nothing here writes secrets anywhere.

use async_trait::async_trait;
use relay_types::{Credential, LaunchSpec, ProviderDescriptor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

static KEYRING_SERVICE: &str = "relay";

/// Read access to users' stored provider authorizations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user_credential(&self, user_id: &str, provider_name: &str) -> Result<Option<Credential>, CredentialStoreError>;
}

/// Errors surfaced by credential stores.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid credential data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Keyring error for {account}: {error}")]
    Keyring { account: String, error: String },
}

/// Credentials held in memory, keyed by user and provider.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    credentials: HashMap<(String, String), Credential>,
}

impl InMemoryCredentialStore {
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let mut store = Self::default();
        for credential in credentials {
            store.insert(credential);
        }
        store
    }

    /// Load a JSON array of credentials.
    pub fn from_path(path: &Path) -> Result<Self, CredentialStoreError> {
        let content = std::fs::read_to_string(path)?;
        let credentials: Vec<Credential> = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    pub fn insert(&mut self, credential: Credential) {
        let key = (credential.user_id.clone(), credential.provider_name.clone());
        self.credentials.insert(key, credential);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_user_credential(&self, user_id: &str, provider_name: &str) -> Result<Option<Credential>, CredentialStoreError> {
        Ok(self
            .credentials
            .get(&(user_id.to_string(), provider_name.to_string()))
            .cloned())
    }
}

/// Credentials stored in the OS keychain.
///
/// Each entry lives under service `relay`, account `<user>:<provider>`, and holds the JSON
/// object of credential key to secret value.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    fn account(user_id: &str, provider_name: &str) -> String {
        format!("{user_id}:{provider_name}")
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn get_user_credential(&self, user_id: &str, provider_name: &str) -> Result<Option<Credential>, CredentialStoreError> {
        let account = Self::account(user_id, provider_name);
        let lookup_account = account.clone();
        let secret = tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(KEYRING_SERVICE, &lookup_account)?;
            match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(error) => Err(error),
            }
        })
        .await
        .map_err(|error| CredentialStoreError::Keyring {
            account: account.clone(),
            error: error.to_string(),
        })?
        .map_err(|error| CredentialStoreError::Keyring {
            account: account.clone(),
            error: error.to_string(),
        })?;

        let Some(secret) = secret else {
            return Ok(None);
        };
        Ok(Some(Credential {
            user_id: user_id.to_string(),
            provider_name: provider_name.to_string(),
            is_verified: true,
            auth_data: serde_json::from_str(&secret)?,
        }))
    }
}

/// Merges user credentials into provider launch parameters.
#[derive(Clone)]
pub struct CredentialInjector {
    store: Arc<dyn CredentialStore>,
}

impl CredentialInjector {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Launch parameters for `descriptor` with missing credential keys filled from the user's
    /// verified credential.
    ///
    /// Keys that remain unresolved are set to an empty string; the provider then rejects the
    /// call and the step fails normally.
    pub async fn resolve(&self, descriptor: &ProviderDescriptor, user_id: &str) -> LaunchSpec {
        let mut launch = descriptor.launch.clone();
        let missing = missing_keys(descriptor);
        if missing.is_empty() {
            return launch;
        }

        let credential = self.verified_credential(descriptor, user_id).await;
        let slots = launch.credential_slots_mut();
        for key in missing {
            let value = credential.as_ref().and_then(|credential| lookup_secret(credential, &key));
            match value {
                Some(secret) => {
                    debug!(provider = %descriptor.name, key = %key, "injected credential value [REDACTED]");
                    slots.insert(key, secret.to_string());
                }
                None => {
                    warn!(provider = %descriptor.name, key = %key, "credential unresolved, continuing with empty value");
                    slots.insert(key, String::new());
                }
            }
        }
        launch
    }

    /// Whether `user_id` holds everything `descriptor` needs to authenticate.
    pub async fn has_required_credentials(&self, descriptor: &ProviderDescriptor, user_id: &str) -> bool {
        if !descriptor.auth_required {
            return true;
        }
        let missing = missing_keys(descriptor);
        if !descriptor.auth_param_names.is_empty() && missing.is_empty() {
            return true;
        }
        match self.verified_credential(descriptor, user_id).await {
            Some(credential) => missing.iter().all(|key| lookup_secret(&credential, key).is_some()),
            None => false,
        }
    }

    async fn verified_credential(&self, descriptor: &ProviderDescriptor, user_id: &str) -> Option<Credential> {
        match self.store.get_user_credential(user_id, &descriptor.name).await {
            Ok(Some(credential)) if credential.is_verified => Some(credential),
            Ok(Some(_)) => {
                debug!(provider = %descriptor.name, "ignoring unverified credential");
                None
            }
            Ok(None) => None,
            Err(error) => {
                warn!(provider = %descriptor.name, error = %error, "credential store lookup failed");
                None
            }
        }
    }
}

fn missing_keys(descriptor: &ProviderDescriptor) -> Vec<String> {
    descriptor
        .auth_param_names
        .iter()
        .filter(|key| descriptor.static_value(key).is_none())
        .cloned()
        .collect()
}

fn lookup_secret<'a>(credential: &'a Credential, key: &str) -> Option<&'a str> {
    credential
        .auth_data
        .get(key)
        .or_else(|| {
            credential
                .auth_data
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn weather(env: &[(&str, &str)]) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "weather".into(),
            launch: LaunchSpec::Subprocess {
                command: "weather-mcp".into(),
                args: vec![],
                env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                cwd: None,
            },
            category: None,
            auth_required: true,
            auth_param_names: ["API_KEY".to_string()].into_iter().collect(),
            static_operations: vec![],
            parameter_aliases: IndexMap::new(),
        }
    }

    fn credential(verified: bool) -> Credential {
        Credential {
            user_id: "u1".into(),
            provider_name: "weather".into(),
            is_verified: verified,
            auth_data: IndexMap::from([("api_key".to_string(), "secret-value".to_string())]),
        }
    }

    fn injector(credentials: Vec<Credential>) -> CredentialInjector {
        CredentialInjector::new(Arc::new(InMemoryCredentialStore::new(credentials)))
    }

    #[tokio::test]
    async fn fills_missing_keys_from_verified_credential() {
        let launch = injector(vec![credential(true)]).resolve(&weather(&[]), "u1").await;
        assert_eq!(launch.credential_slots().get("API_KEY").map(String::as_str), Some("secret-value"));
    }

    #[tokio::test]
    async fn static_values_win_over_credentials() {
        let launch = injector(vec![credential(true)])
            .resolve(&weather(&[("API_KEY", "static")]), "u1")
            .await;
        assert_eq!(launch.credential_slots()["API_KEY"], "static");
    }

    #[tokio::test]
    async fn unresolved_keys_are_left_empty() {
        let launch = injector(vec![credential(false)]).resolve(&weather(&[]), "u1").await;
        assert_eq!(launch.credential_slots()["API_KEY"], "");

        let launch = injector(vec![]).resolve(&weather(&[]), "someone-else").await;
        assert_eq!(launch.credential_slots()["API_KEY"], "");
    }

    #[tokio::test]
    async fn required_credentials_check() {
        let descriptor = weather(&[]);
        assert!(injector(vec![credential(true)]).has_required_credentials(&descriptor, "u1").await);
        assert!(!injector(vec![credential(false)]).has_required_credentials(&descriptor, "u1").await);
        assert!(!injector(vec![]).has_required_credentials(&descriptor, "u1").await);
        assert!(
            injector(vec![])
                .has_required_credentials(&weather(&[("API_KEY", "static")]), "u1")
                .await
        );
    }

    #[test]
    fn loads_credentials_from_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"[{"userId": "u1", "providerName": "weather", "isVerified": true, "authData": {"API_KEY": "k"}}]"#,
        )
        .expect("write credentials");

        let store = InMemoryCredentialStore::from_path(&path).expect("load store");
        assert_eq!(store.credentials.len(), 1);
    }
}
