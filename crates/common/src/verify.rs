//! Token store assertions
//!
//! Each assertion is a pure query over a snapshot or inventory that fails with
//! a [`CheckError`] naming exactly what disagreed.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CheckError, Result};
use crate::inventory::{classify, TokenInventory};
use crate::scopes::ScopeSet;
use crate::snapshot::{capture_snapshot, StorageSnapshot, StorageSource};
use crate::types::{StorageKind, TokenCounts, TokenKind};

/// Compare bucket sizes against `expected`, reporting the first bucket that differs
pub fn assert_counts(inventory: &TokenInventory, expected: TokenCounts) -> Result<()> {
    for kind in TokenKind::ALL {
        let actual = inventory.bucket(kind).len();
        let want = expected.get(kind);
        if actual != want {
            return Err(CheckError::CountMismatch {
                kind,
                expected: want,
                actual,
            });
        }
    }
    Ok(())
}

/// Storage-hygiene check: no bookkeeping keys beyond what the flow should write
pub fn assert_total_entries(snapshot: &StorageSnapshot, expected: usize) -> Result<()> {
    let actual = snapshot.total_entry_count();
    if actual != expected {
        return Err(CheckError::EntryCountMismatch { expected, actual });
    }
    Ok(())
}

/// Every id token must have an account entry
pub fn assert_account_for_id_tokens(inventory: &TokenInventory) -> Result<()> {
    match inventory
        .id_tokens
        .iter()
        .find(|entry| !inventory.account_exists_for_token(entry))
    {
        Some(entry) => Err(CheckError::MissingAccount {
            key: entry.key.clone(),
        }),
        None => Ok(()),
    }
}

/// Every credential must have an account entry
pub fn assert_accounts_linked(inventory: &TokenInventory) -> Result<()> {
    match inventory.orphaned_credentials().first() {
        Some((kind, entry)) => Err(CheckError::OrphanedCredential {
            kind: *kind,
            key: entry.key.clone(),
        }),
        None => Ok(()),
    }
}

/// Some access token must have been issued for at least `scopes`
pub fn assert_scopes_covered<S: AsRef<str>>(
    inventory: &TokenInventory,
    scopes: &[S],
) -> Result<()> {
    if inventory.access_token_covers_scopes(scopes.iter().map(|s| s.as_ref())) {
        return Ok(());
    }
    Err(CheckError::ScopesNotCovered {
        required: scopes.iter().map(|s| s.as_ref().to_string()).collect(),
    })
}

/// Expected state of a token store after an authentication flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStoreExpectation {
    #[serde(default = "TokenCounts::single_sign_in")]
    pub counts: TokenCounts,

    /// Scopes some access token must cover
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Exact number of keys in the storage medium, unclassified ones included
    #[serde(default)]
    pub total_entries: Option<usize>,

    /// Also require an account for every access and refresh token
    #[serde(default)]
    pub require_linked_accounts: bool,
}

impl Default for TokenStoreExpectation {
    fn default() -> Self {
        Self {
            counts: TokenCounts::single_sign_in(),
            scopes: Vec::new(),
            total_entries: None,
            require_linked_accounts: false,
        }
    }
}

impl TokenStoreExpectation {
    pub fn new(counts: TokenCounts) -> Self {
        Self {
            counts,
            ..Default::default()
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_total_entries(mut self, total: usize) -> Self {
        self.total_entries = Some(total);
        self
    }

    pub fn with_linked_accounts(mut self) -> Self {
        self.require_linked_accounts = true;
        self
    }

    /// Run every check against `snapshot` and hand back the inventory on success
    pub fn verify(&self, snapshot: &StorageSnapshot) -> Result<TokenInventory> {
        let inventory = classify(snapshot);

        assert_counts(&inventory, self.counts)?;
        assert_account_for_id_tokens(&inventory)?;
        if self.require_linked_accounts {
            assert_accounts_linked(&inventory)?;
        }
        if !self.scopes.is_empty() {
            assert_scopes_covered(&inventory, &self.scopes)?;
        }
        if let Some(total) = self.total_entries {
            assert_total_entries(snapshot, total)?;
        }

        debug!(
            "Token store verified: {} classified, {} unclassified",
            inventory.classified_count(),
            inventory.unclassified_count()
        );
        Ok(inventory)
    }

    pub fn required_scopes(&self) -> ScopeSet {
        self.scopes.iter().collect()
    }
}

/// Capture `kind` from `source` and verify it against `expectation`
pub async fn verify_token_store<S>(
    source: &S,
    kind: StorageKind,
    timeout: Duration,
    expectation: &TokenStoreExpectation,
) -> Result<TokenInventory>
where
    S: StorageSource + ?Sized,
{
    let snapshot = capture_snapshot(source, kind, timeout).await?;
    let inventory = expectation.verify(&snapshot)?;
    info!(
        "{} holds {} id, {} access, {} refresh token(s)",
        kind,
        inventory.id_tokens.len(),
        inventory.access_tokens.len(),
        inventory.refresh_tokens.len()
    );
    Ok(inventory)
}
