//! User credentials read from an external authorization store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A user's stored authorization for one provider.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub user_id: String,
    pub provider_name: String,
    #[serde(default)]
    pub is_verified: bool,
    /// Credential key -> secret value.
    #[serde(default)]
    pub auth_data: IndexMap<String, String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("provider_name", &self.provider_name)
            .field("is_verified", &self.is_verified)
            .field("auth_data", &self.auth_data.keys().collect::<Vec<_>>())
            .finish()
    }
}
