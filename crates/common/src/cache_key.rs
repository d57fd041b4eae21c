//! Cache key grammar
//!
//! The authentication SDK names every cache entry by joining fields with `-`.
//! Home-account ids, client ids and realms are usually GUIDs and contain the
//! delimiter themselves, so keys cannot be split naively. Instead each key is
//! matched against an ordered rule table; the first matching rule decides the
//! entry type.
//!
//! ```text
//! internal            msal.* | server-telemetry-*
//! authority metadata  authority-metadata-<clientId>-<host>
//! app metadata        appmetadata-<environment>-<clientId>
//! credential          <homeAccountId>-<environment>-<type>-<clientId>-<realm>-
//!                         <target>[-<claims>-<scheme>]
//! account             <homeAccountId>-<environment>-<realm>
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

macro_rules! guid {
    () => {
        "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
    };
}

/// Kind of rule in the key grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Internal,
    AuthorityMetadata,
    AppMetadata,
    Credential,
    Account,
}

struct KeyRule {
    kind: RuleKind,
    pattern: &'static str,
}

/// Ordered key grammar. Earlier rules shadow later ones.
const KEY_RULES: &[KeyRule] = &[
    KeyRule {
        kind: RuleKind::Internal,
        pattern: r"(?i)^(?:msal\.|server-telemetry-)",
    },
    KeyRule {
        kind: RuleKind::AuthorityMetadata,
        pattern: concat!(
            r"(?i)^authority-metadata-(?P<client>",
            guid!(),
            r"|[^-]+)-(?P<host>.+)$"
        ),
    },
    KeyRule {
        kind: RuleKind::AppMetadata,
        pattern: r"(?i)^appmetadata-(?P<env>[^-]+)-(?P<client>.+)$",
    },
    KeyRule {
        kind: RuleKind::Credential,
        pattern: concat!(
            r"(?i)^(?P<home>.+?)-(?P<env>[^-]+)-",
            r"(?P<type>idtoken|accesstoken_with_authscheme|accesstoken|refreshtoken)-",
            r"(?P<client>",
            guid!(),
            r"|[^-]*)-(?P<realm>",
            guid!(),
            r"|[^-]*)(?:-(?P<tail>.*))?$"
        ),
    },
    KeyRule {
        kind: RuleKind::Account,
        pattern: concat!(
            r"(?i)^(?P<home>.+)-(?P<env>[^-]*\.[^-]*)-(?P<realm>",
            guid!(),
            r"|[^-]+)$"
        ),
    },
];

static COMPILED_RULES: Lazy<Vec<(RuleKind, Regex)>> = Lazy::new(|| {
    KEY_RULES
        .iter()
        .map(|rule| {
            let re = Regex::new(rule.pattern).expect("key grammar patterns are valid");
            (rule.kind, re)
        })
        .collect()
});

/// Credential type named in a credential key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    IdToken,
    AccessToken,
    RefreshToken,
}

impl CredentialType {
    /// Whether a `credentialType` field from a cached value names this type
    pub fn matches_value(&self, credential_type: &str) -> bool {
        let value = credential_type.to_ascii_lowercase();
        match self {
            CredentialType::IdToken => value == "idtoken",
            CredentialType::AccessToken => {
                value == "accesstoken" || value == "accesstoken_with_authscheme"
            }
            CredentialType::RefreshToken => value == "refreshtoken",
        }
    }
}

/// Parsed fields of a credential key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialKey {
    pub credential_type: CredentialType,
    pub home_account_id: String,
    pub environment: String,
    /// Client id, or family id for family refresh tokens
    pub client_id: String,
    pub realm: String,
    /// Scope string as written into the key
    pub target: String,
    /// Requested-claims hash segment, empty when no claims were requested
    pub claims: String,
    /// Token-type segment, e.g. `pop`; empty for bearer tokens
    pub scheme: String,
    /// Key used the `accesstoken_with_authscheme` discriminator
    pub auth_scheme: bool,
}

/// Parsed fields of an account key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountKey {
    pub home_account_id: String,
    pub environment: String,
    pub realm: String,
}

/// Structured decomposition of a storage key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheKey {
    Credential(CredentialKey),
    Account(AccountKey),
    AppMetadata { environment: String, client_id: String },
    AuthorityMetadata { client_id: String, host: String },
    Internal,
    Unrecognized,
}

/// Coarse discriminator of a [`CacheKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    IdToken,
    AccessToken,
    RefreshToken,
    Account,
    AppMetadata,
    AuthorityMetadata,
    Internal,
    Unrecognized,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::IdToken => "idtoken",
            KeyKind::AccessToken => "accesstoken",
            KeyKind::RefreshToken => "refreshtoken",
            KeyKind::Account => "account",
            KeyKind::AppMetadata => "appmetadata",
            KeyKind::AuthorityMetadata => "authority-metadata",
            KeyKind::Internal => "internal",
            KeyKind::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CacheKey {
    /// Parse a storage key against the key grammar
    pub fn parse(key: &str) -> Self {
        for (kind, re) in COMPILED_RULES.iter() {
            if let Some(caps) = re.captures(key) {
                return build(*kind, &caps);
            }
        }
        CacheKey::Unrecognized
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            CacheKey::Credential(c) => match c.credential_type {
                CredentialType::IdToken => KeyKind::IdToken,
                CredentialType::AccessToken => KeyKind::AccessToken,
                CredentialType::RefreshToken => KeyKind::RefreshToken,
            },
            CacheKey::Account(_) => KeyKind::Account,
            CacheKey::AppMetadata { .. } => KeyKind::AppMetadata,
            CacheKey::AuthorityMetadata { .. } => KeyKind::AuthorityMetadata,
            CacheKey::Internal => KeyKind::Internal,
            CacheKey::Unrecognized => KeyKind::Unrecognized,
        }
    }

    pub fn home_account_id(&self) -> Option<&str> {
        match self {
            CacheKey::Credential(c) => Some(&c.home_account_id),
            CacheKey::Account(a) => Some(&a.home_account_id),
            _ => None,
        }
    }
}

fn field(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn build(kind: RuleKind, caps: &Captures<'_>) -> CacheKey {
    match kind {
        RuleKind::Internal => CacheKey::Internal,
        RuleKind::AuthorityMetadata => CacheKey::AuthorityMetadata {
            client_id: field(caps, "client"),
            host: field(caps, "host"),
        },
        RuleKind::AppMetadata => CacheKey::AppMetadata {
            environment: field(caps, "env"),
            client_id: field(caps, "client"),
        },
        RuleKind::Credential => {
            let raw_type = field(caps, "type").to_ascii_lowercase();
            let credential_type = match raw_type.as_str() {
                "idtoken" => CredentialType::IdToken,
                "refreshtoken" => CredentialType::RefreshToken,
                _ => CredentialType::AccessToken,
            };
            let (target, claims, scheme) = split_tail(&field(caps, "tail"));
            CacheKey::Credential(CredentialKey {
                credential_type,
                home_account_id: field(caps, "home"),
                environment: field(caps, "env"),
                client_id: field(caps, "client"),
                realm: field(caps, "realm"),
                target,
                claims,
                scheme,
                auth_scheme: raw_type == "accesstoken_with_authscheme",
            })
        }
        RuleKind::Account => CacheKey::Account(AccountKey {
            home_account_id: field(caps, "home"),
            environment: field(caps, "env"),
            realm: field(caps, "realm"),
        }),
    }
}

/// Split `target-claimsHash-tokenType` from the right. Scopes may contain
/// '-' but the two trailing segments never do. Keys written without the
/// trailing segments keep the whole tail as target.
fn split_tail(tail: &str) -> (String, String, String) {
    if tail.matches('-').count() < 2 {
        return (tail.trim_end_matches('-').to_string(), String::new(), String::new());
    }
    let mut parts = tail.rsplitn(3, '-');
    let scheme = parts.next().unwrap_or_default().to_string();
    let claims = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    (target, claims, scheme)
}
