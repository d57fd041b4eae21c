//! Cached entity values stored under credential and account keys

use serde::{Deserialize, Deserializer, Serialize};

use crate::cache_key::CredentialType;
use crate::scopes::ScopeSet;

/// A cached id token, access token or refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntity {
    pub home_account_id: String,
    pub environment: String,
    pub credential_type: String,
    pub client_id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub family_id: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub cached_at: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_on: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub extended_expires_on: Option<String>,
}

impl CredentialEntity {
    /// Scopes this credential was issued for
    pub fn scopes(&self) -> ScopeSet {
        self.target
            .as_deref()
            .map(ScopeSet::from_target)
            .unwrap_or_default()
    }

    /// Whether the value's `credentialType` agrees with a key's discriminator
    pub fn is_type(&self, credential_type: CredentialType) -> bool {
        credential_type.matches_value(&self.credential_type)
    }
}

/// A cached account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntity {
    pub home_account_id: String,
    pub environment: String,
    #[serde(default)]
    pub realm: String,
    #[serde(default)]
    pub local_account_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub authority_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

// Timestamps are written as strings by current SDK releases and as numbers by
// older ones.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
