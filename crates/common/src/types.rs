//! Core types shared by the checker and the scenario harness

use serde::{Deserialize, Serialize};

/// Browser storage medium a snapshot is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Local,
    Session,
}

impl StorageKind {
    /// Name of the `window` property holding this medium
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "localStorage",
            StorageKind::Session => "sessionStorage",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "localstorage" => Ok(StorageKind::Local),
            "session" | "sessionstorage" => Ok(StorageKind::Session),
            other => Err(format!("unknown storage kind: {}", other)),
        }
    }
}

/// Typed token bucket of an inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "idTokens")]
    IdTokens,
    #[serde(rename = "accessTokens")]
    AccessTokens,
    #[serde(rename = "refreshTokens")]
    RefreshTokens,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [
        TokenKind::IdTokens,
        TokenKind::AccessTokens,
        TokenKind::RefreshTokens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::IdTokens => "idTokens",
            TokenKind::AccessTokens => "accessTokens",
            TokenKind::RefreshTokens => "refreshTokens",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected (or observed) cardinality of the three token buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    #[serde(default)]
    pub id_tokens: usize,
    #[serde(default)]
    pub access_tokens: usize,
    #[serde(default)]
    pub refresh_tokens: usize,
}

impl TokenCounts {
    pub fn new(id_tokens: usize, access_tokens: usize, refresh_tokens: usize) -> Self {
        Self {
            id_tokens,
            access_tokens,
            refresh_tokens,
        }
    }

    /// One of each token, the state after a single interactive sign-in
    pub fn single_sign_in() -> Self {
        Self::new(1, 1, 1)
    }

    pub fn get(&self, kind: TokenKind) -> usize {
        match kind {
            TokenKind::IdTokens => self.id_tokens,
            TokenKind::AccessTokens => self.access_tokens,
            TokenKind::RefreshTokens => self.refresh_tokens,
        }
    }
}
