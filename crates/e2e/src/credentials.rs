//! Test account credentials

use std::fmt;

use crate::error::{E2eError, E2eResult};

pub const USERNAME_ENV: &str = "CACHECHECK_USERNAME";
pub const PASSWORD_ENV: &str = "CACHECHECK_PASSWORD";

/// Username and password of the test account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials to `enter_credentials` steps
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> E2eResult<Credentials>;
}

impl CredentialProvider for Credentials {
    fn credentials(&self) -> E2eResult<Credentials> {
        Ok(self.clone())
    }
}

/// Reads `CACHECHECK_USERNAME` / `CACHECHECK_PASSWORD` at use time
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> E2eResult<Credentials> {
        let username = std::env::var(USERNAME_ENV).unwrap_or_default();
        let password = std::env::var(PASSWORD_ENV).unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(E2eError::MissingCredentials);
        }
        Ok(Credentials { username, password })
    }
}
