//! Error types for the token cache checker

use thiserror::Error;

use crate::types::{StorageKind, TokenKind};

/// Result type alias using the checker error
pub type Result<T> = std::result::Result<T, CheckError>;

/// Checker error types
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("{kind} unavailable: {reason}")]
    StorageUnavailable { kind: StorageKind, reason: String },

    #[error("{kind} count mismatch: expected {expected}, found {actual}")]
    CountMismatch {
        kind: TokenKind,
        expected: usize,
        actual: usize,
    },

    #[error("storage entry count mismatch: expected {expected}, found {actual}")]
    EntryCountMismatch { expected: usize, actual: usize },

    #[error("No account entry for id token {key}")]
    MissingAccount { key: String },

    #[error("{kind} entry {key} has no matching account entry")]
    OrphanedCredential { kind: TokenKind, key: String },

    #[error("No access token covers scopes [{}]", required.join(" "))]
    ScopesNotCovered { required: Vec<String> },

    #[error("Snapshot format error: {0}")]
    SnapshotFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckError {
    pub fn storage_unavailable(kind: StorageKind, reason: impl Into<String>) -> Self {
        CheckError::StorageUnavailable {
            kind,
            reason: reason.into(),
        }
    }
}
