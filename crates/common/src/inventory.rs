//! Typed token inventory derived from a storage snapshot

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache_key::{AccountKey, CacheKey, CredentialKey, CredentialType, KeyKind};
use crate::cache_value::{AccountEntity, CredentialEntity};
use crate::scopes::ScopeSet;
use crate::snapshot::StorageSnapshot;
use crate::types::{StorageKind, TokenCounts, TokenKind};

/// A classified id token, access token or refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialEntry {
    pub key: String,
    pub cache_key: CredentialKey,
    pub value: CredentialEntity,
}

impl CredentialEntry {
    /// Home-account id as recorded in the cached value
    pub fn home_account_id(&self) -> &str {
        &self.value.home_account_id
    }

    /// Scopes from the value's `target`, falling back to the key's target segment
    pub fn scopes(&self) -> ScopeSet {
        let from_value = self.value.scopes();
        if from_value.is_empty() {
            ScopeSet::from_target(&self.cache_key.target)
        } else {
            from_value
        }
    }
}

/// A classified account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountEntry {
    pub key: String,
    pub cache_key: AccountKey,
    pub value: AccountEntity,
}

impl AccountEntry {
    pub fn home_account_id(&self) -> &str {
        &self.value.home_account_id
    }
}

/// A key left out of the typed buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnclassifiedEntry {
    pub key: String,
    /// What the key grammar made of the key; a token or account kind here
    /// means the value did not deserialise as that entity.
    pub kind: KeyKind,
}

/// Typed view of one storage snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInventory {
    pub storage: StorageKind,
    pub id_tokens: Vec<CredentialEntry>,
    pub access_tokens: Vec<CredentialEntry>,
    pub refresh_tokens: Vec<CredentialEntry>,
    pub accounts: Vec<AccountEntry>,
    pub unclassified: Vec<UnclassifiedEntry>,
}

/// Classify every key of `snapshot`. Entries keep their capture order.
pub fn classify(snapshot: &StorageSnapshot) -> TokenInventory {
    let mut inventory = TokenInventory {
        storage: snapshot.kind(),
        id_tokens: Vec::new(),
        access_tokens: Vec::new(),
        refresh_tokens: Vec::new(),
        accounts: Vec::new(),
        unclassified: Vec::new(),
    };

    for (key, value) in snapshot.iter() {
        let cache_key = CacheKey::parse(key);
        let kind = cache_key.kind();

        match cache_key {
            CacheKey::Credential(parsed) => {
                match serde_json::from_str::<CredentialEntity>(value) {
                    Ok(entity) if entity.is_type(parsed.credential_type) => {
                        debug!("Classified {} as {}", key, kind);
                        let entry = CredentialEntry {
                            key: key.to_string(),
                            cache_key: parsed,
                            value: entity,
                        };
                        match entry.cache_key.credential_type {
                            CredentialType::IdToken => inventory.id_tokens.push(entry),
                            CredentialType::AccessToken => inventory.access_tokens.push(entry),
                            CredentialType::RefreshToken => inventory.refresh_tokens.push(entry),
                        }
                        continue;
                    }
                    Ok(entity) => {
                        warn!(
                            "Key {} names a {} but value has credentialType {}",
                            key, kind, entity.credential_type
                        );
                    }
                    Err(e) => {
                        debug!("Value of {} key {} is not a credential: {}", kind, key, e);
                    }
                }
            }
            CacheKey::Account(parsed) => match serde_json::from_str::<AccountEntity>(value) {
                Ok(entity) => {
                    debug!("Classified {} as account", key);
                    inventory.accounts.push(AccountEntry {
                        key: key.to_string(),
                        cache_key: parsed,
                        value: entity,
                    });
                    continue;
                }
                Err(e) => {
                    debug!("Value of account-shaped key {} is not an account: {}", key, e);
                }
            },
            _ => {
                debug!("Leaving {} key {} unclassified", kind, key);
            }
        }

        inventory.unclassified.push(UnclassifiedEntry {
            key: key.to_string(),
            kind,
        });
    }

    inventory
}

impl TokenInventory {
    pub fn from_snapshot(snapshot: &StorageSnapshot) -> Self {
        classify(snapshot)
    }

    pub fn bucket(&self, kind: TokenKind) -> &[CredentialEntry] {
        match kind {
            TokenKind::IdTokens => &self.id_tokens,
            TokenKind::AccessTokens => &self.access_tokens,
            TokenKind::RefreshTokens => &self.refresh_tokens,
        }
    }

    /// Observed size of the three token buckets
    pub fn counts(&self) -> TokenCounts {
        TokenCounts::new(
            self.id_tokens.len(),
            self.access_tokens.len(),
            self.refresh_tokens.len(),
        )
    }

    /// All credential entries tagged with their bucket
    pub fn credentials(&self) -> impl Iterator<Item = (TokenKind, &CredentialEntry)> {
        TokenKind::ALL
            .into_iter()
            .flat_map(move |kind| self.bucket(kind).iter().map(move |e| (kind, e)))
    }

    pub fn classified_count(&self) -> usize {
        self.id_tokens.len()
            + self.access_tokens.len()
            + self.refresh_tokens.len()
            + self.accounts.len()
    }

    pub fn unclassified_count(&self) -> usize {
        self.unclassified.len()
    }

    /// Equals the snapshot's `total_entry_count`
    pub fn total_entry_count(&self) -> usize {
        self.classified_count() + self.unclassified_count()
    }

    /// Account entry sharing the credential's home-account id
    pub fn account_for(&self, entry: &CredentialEntry) -> Option<&AccountEntry> {
        let home = entry.home_account_id();
        self.accounts
            .iter()
            .find(|a| a.home_account_id().eq_ignore_ascii_case(home))
    }

    /// Whether an account entry exists for this token. Absence is a normal
    /// outcome, not an error.
    pub fn account_exists_for_token(&self, entry: &CredentialEntry) -> bool {
        self.account_for(entry).is_some()
    }

    /// True iff some access token's scopes are a superset of `scopes`
    pub fn access_token_covers_scopes<I, S>(&self, scopes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required: ScopeSet = scopes.into_iter().collect();
        self.access_tokens
            .iter()
            .any(|token| token.scopes().is_superset_of(&required))
    }

    /// Credentials with no account entry for their home-account id
    pub fn orphaned_credentials(&self) -> Vec<(TokenKind, &CredentialEntry)> {
        self.credentials()
            .filter(|(_, entry)| !self.account_exists_for_token(entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_token(home: &str) -> (String, String) {
        (
            format!("{home}-login.microsoftonline.com-idtoken-client-tenant-"),
            serde_json::json!({
                "homeAccountId": home,
                "environment": "login.microsoftonline.com",
                "credentialType": "IdToken",
                "clientId": "client",
                "realm": "tenant",
                "secret": "x"
            })
            .to_string(),
        )
    }

    #[test]
    fn test_value_type_disagreement_is_unclassified() {
        let (key, _) = id_token("uid.utid");
        let value = serde_json::json!({
            "homeAccountId": "uid.utid",
            "environment": "login.microsoftonline.com",
            "credentialType": "RefreshToken",
            "clientId": "client"
        })
        .to_string();
        let inventory = classify(&StorageSnapshot::new(StorageKind::Local, [(key, value)]));
        assert!(inventory.id_tokens.is_empty());
        assert_eq!(inventory.unclassified[0].kind, KeyKind::IdToken);
    }

    #[test]
    fn test_garbage_value_is_unclassified() {
        let (key, _) = id_token("uid.utid");
        let inventory = classify(&StorageSnapshot::new(StorageKind::Local, [(key, "not json")]));
        assert_eq!(inventory.counts(), TokenCounts::default());
        assert_eq!(inventory.total_entry_count(), 1);
    }

    #[test]
    fn test_account_lookup_ignores_case() {
        let (key, value) = id_token("UID.UTID");
        let account_value = serde_json::json!({
            "homeAccountId": "uid.utid",
            "environment": "login.microsoftonline.com",
            "realm": "tenant"
        });
        let snapshot = StorageSnapshot::new(
            StorageKind::Session,
            [
                (key, value),
                (
                    "uid.utid-login.microsoftonline.com-tenant".to_string(),
                    account_value.to_string(),
                ),
            ],
        );
        let inventory = classify(&snapshot);
        assert_eq!(inventory.storage, StorageKind::Session);
        assert!(inventory.account_exists_for_token(&inventory.id_tokens[0]));
        assert!(inventory.orphaned_credentials().is_empty());
    }
}
