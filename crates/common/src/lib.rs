//! cachecheck common library
//!
//! Browser storage token inventory checker: captures a snapshot of a storage
//! medium, classifies its keys against the authentication SDK's cache-key
//! grammar, and asserts expected token cardinalities and relationships.
//!
//! ```text
//! StorageSource ──capture_snapshot──▶ StorageSnapshot ──classify──▶ TokenInventory
//!                                            │                          │
//!                                   total_entry_count        assert_counts / scopes / accounts
//! ```

pub mod cache_key;
pub mod cache_value;
pub mod error;
pub mod inventory;
pub mod scopes;
pub mod snapshot;
pub mod types;
pub mod verify;

// Re-export commonly used types
pub use cache_key::{CacheKey, CredentialType, KeyKind};
pub use error::{CheckError, Result};
pub use inventory::{classify, AccountEntry, CredentialEntry, TokenInventory};
pub use scopes::ScopeSet;
pub use snapshot::{capture_snapshot, MemoryStorage, StorageSnapshot, StorageSource};
pub use types::*;
pub use verify::{
    assert_account_for_id_tokens, assert_accounts_linked, assert_counts, assert_scopes_covered,
    assert_total_entries, verify_token_store, TokenStoreExpectation,
};

/// cachecheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
