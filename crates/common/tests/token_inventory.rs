use cachecheck_common::{
    assert_counts, classify, verify_token_store, CheckError, MemoryStorage, StorageKind,
    StorageSnapshot, TokenCounts, TokenKind, TokenStoreExpectation,
};
use std::time::Duration;
use test_case::test_case;

const CLIENT: &str = "bc77b0a7-16aa-4af4-884b-41b968c9c71a";
const TENANT: &str = "72f988bf-86f1-41af-91ab-2d7cd011db47";
const ENV: &str = "login.microsoftonline.com";

fn home(uid: &str) -> String {
    format!("{uid}.{TENANT}")
}

fn id_token(home: &str) -> (String, String) {
    (
        format!("{home}-{ENV}-idtoken-{CLIENT}-{TENANT}-"),
        serde_json::json!({
            "homeAccountId": home,
            "environment": ENV,
            "credentialType": "IdToken",
            "clientId": CLIENT,
            "realm": TENANT,
            "secret": "eyJ0eXAiOiJKV1QiLCJhbGciOiJSUzI1NiJ9"
        })
        .to_string(),
    )
}

fn access_token(home: &str, target: &str) -> (String, String) {
    (
        format!("{home}-{ENV}-accesstoken-{CLIENT}-{TENANT}-{}--", target.to_lowercase()),
        serde_json::json!({
            "homeAccountId": home,
            "environment": ENV,
            "credentialType": "AccessToken",
            "clientId": CLIENT,
            "realm": TENANT,
            "target": target,
            "secret": "eyJ0eXAi",
            "cachedAt": "1690000000",
            "expiresOn": "1690003600",
            "extendedExpiresOn": "1690007200",
            "tokenType": "Bearer"
        })
        .to_string(),
    )
}

/// Access token whose value omits `target`, keyed with the given
/// discriminator and `target-claims-scheme` tail
fn untargeted_access_token(home: &str, key_type: &str, tail: &str) -> (String, String) {
    let credential_type = if key_type == "accesstoken_with_authscheme" {
        "AccessToken_With_AuthScheme"
    } else {
        "AccessToken"
    };
    (
        format!("{home}-{ENV}-{key_type}-{CLIENT}-{TENANT}-{tail}"),
        serde_json::json!({
            "homeAccountId": home,
            "environment": ENV,
            "credentialType": credential_type,
            "clientId": CLIENT,
            "realm": TENANT,
            "secret": "eyJ0eXAi"
        })
        .to_string(),
    )
}

fn refresh_token(home: &str) -> (String, String) {
    (
        format!("{home}-{ENV}-refreshtoken-{CLIENT}--"),
        serde_json::json!({
            "homeAccountId": home,
            "environment": ENV,
            "credentialType": "RefreshToken",
            "clientId": CLIENT,
            "secret": "0.AXEA"
        })
        .to_string(),
    )
}

fn account(home: &str) -> (String, String) {
    (
        format!("{home}-{ENV}-{TENANT}"),
        serde_json::json!({
            "homeAccountId": home,
            "environment": ENV,
            "realm": TENANT,
            "localAccountId": home.split('.').next().unwrap_or_default(),
            "username": "user@contoso.com",
            "authorityType": "MSSTS",
            "name": "Test User"
        })
        .to_string(),
    )
}

fn bookkeeping() -> Vec<(String, String)> {
    vec![
        (
            format!("msal.{CLIENT}.active-account-filters"),
            r#"{"homeAccountId":"x"}"#.to_string(),
        ),
        (
            format!("server-telemetry-{CLIENT}"),
            r#"{"failedRequests":[],"errors":[],"cacheHits":0}"#.to_string(),
        ),
        (
            format!("authority-metadata-{CLIENT}-{ENV}"),
            r#"{"aliases":["login.microsoftonline.com"]}"#.to_string(),
        ),
    ]
}

/// One of each token, one account and three bookkeeping keys
fn scenario_a() -> Vec<(String, String)> {
    let h = home("00000000-0000-0000-66f3-3332eca7ea81");
    let mut entries = vec![
        account(&h),
        id_token(&h),
        access_token(&h, "openid profile User.Read"),
        refresh_token(&h),
    ];
    entries.extend(bookkeeping());
    entries
}

#[test]
fn classification_is_idempotent() {
    let snapshot = StorageSnapshot::new(StorageKind::Local, scenario_a());
    assert_eq!(classify(&snapshot), classify(&snapshot));
}

#[test]
fn classification_conserves_entry_count() {
    let mut entries = scenario_a();
    entries.push(("some-unrelated-key".into(), "42".into()));
    entries.push((id_token("bad.home").0, "not json".into()));
    let snapshot = StorageSnapshot::new(StorageKind::Local, entries);

    let inv = classify(&snapshot);
    assert_eq!(
        inv.id_tokens.len()
            + inv.access_tokens.len()
            + inv.refresh_tokens.len()
            + inv.accounts.len()
            + inv.unclassified.len(),
        snapshot.total_entry_count()
    );
    assert_eq!(inv.unclassified.len(), 5);
}

#[test]
fn classification_preserves_capture_order() {
    let a = home("aaaaaaaa-0000-0000-0000-000000000001");
    let b = home("bbbbbbbb-0000-0000-0000-000000000002");
    let snapshot = StorageSnapshot::new(StorageKind::Local, [id_token(&b), id_token(&a)]);

    let inv = classify(&snapshot);
    let homes: Vec<&str> = inv.id_tokens.iter().map(|e| e.home_account_id()).collect();
    assert_eq!(homes, vec![b.as_str(), a.as_str()]);
}

#[test]
fn access_token_scope_superset() {
    let snapshot = StorageSnapshot::new(StorageKind::Local, scenario_a());
    let inv = classify(&snapshot);

    assert!(inv.access_token_covers_scopes(["User.Read"]));
    assert!(inv.access_token_covers_scopes(["user.read", "OpenID"]));
    assert!(!inv.access_token_covers_scopes(["Mail.Read"]));
    assert!(!inv.access_token_covers_scopes(["User.Read", "Mail.Read"]));
}

#[test_case("accesstoken", "openid user.read--" ; "bearer key")]
#[test_case("accesstoken_with_authscheme", "openid user.read--pop" ; "pop key")]
#[test_case("accesstoken", "openid user.read-5e1a9c-" ; "claims hash key")]
fn key_target_covers_scopes_when_value_has_none(key_type: &str, tail: &str) {
    let h = home("00000000-0000-0000-66f3-3332eca7ea81");
    let snapshot = StorageSnapshot::new(
        StorageKind::Local,
        vec![account(&h), untargeted_access_token(&h, key_type, tail)],
    );
    let inv = classify(&snapshot);

    assert_eq!(inv.access_tokens.len(), 1);
    assert!(inv.access_token_covers_scopes(["User.Read"]));
    assert!(inv.access_token_covers_scopes(["openid", "user.read"]));
    assert!(!inv.access_token_covers_scopes(["pop"]));
    assert!(!inv.access_token_covers_scopes(["user.read-5e1a9c"]));
}

#[test]
fn account_linkage() {
    let h1 = home("11111111-0000-0000-0000-000000000001");
    let with_account = StorageSnapshot::new(StorageKind::Local, [id_token(&h1), account(&h1)]);
    let inv = classify(&with_account);
    assert!(inv.account_exists_for_token(&inv.id_tokens[0]));

    let without_account = StorageSnapshot::new(StorageKind::Local, [id_token(&h1)]);
    let inv = classify(&without_account);
    assert!(!inv.account_exists_for_token(&inv.id_tokens[0]));
    assert_eq!(inv.orphaned_credentials().len(), 1);
}

#[test]
fn scenario_a_counts_and_total() {
    let snapshot = StorageSnapshot::new(StorageKind::Local, scenario_a());
    let inv = classify(&snapshot);

    assert!(assert_counts(&inv, TokenCounts::new(1, 1, 1)).is_ok());
    assert_eq!(inv.accounts.len(), 1);
    assert_eq!(snapshot.total_entry_count(), 7);

    let expectation = TokenStoreExpectation::new(TokenCounts::new(1, 1, 1))
        .with_scopes(["User.Read"])
        .with_total_entries(7)
        .with_linked_accounts();
    assert!(expectation.verify(&snapshot).is_ok());
}

#[test]
fn scenario_b_missing_refresh_token() {
    let entries: Vec<_> = scenario_a()
        .into_iter()
        .filter(|(k, _)| !k.contains("-refreshtoken-"))
        .collect();
    let snapshot = StorageSnapshot::new(StorageKind::Local, entries);

    let err = assert_counts(&classify(&snapshot), TokenCounts::new(1, 1, 1)).unwrap_err();
    match err {
        CheckError::CountMismatch {
            kind,
            expected,
            actual,
        } => {
            assert_eq!(kind, TokenKind::RefreshTokens);
            assert_eq!(kind.as_str(), "refreshTokens");
            assert_eq!((expected, actual), (1, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn uncovered_scopes_fail_verification() {
    let snapshot = StorageSnapshot::new(StorageKind::Local, scenario_a());
    let err = TokenStoreExpectation::default()
        .with_scopes(["Mail.Read"])
        .verify(&snapshot)
        .unwrap_err();
    assert!(matches!(err, CheckError::ScopesNotCovered { .. }));
}

#[test]
fn extra_bookkeeping_key_fails_hygiene_check() {
    let mut entries = scenario_a();
    entries.push(("msal.interaction.status".into(), CLIENT.into()));
    let snapshot = StorageSnapshot::new(StorageKind::Local, entries);

    let err = TokenStoreExpectation::default()
        .with_total_entries(7)
        .verify(&snapshot)
        .unwrap_err();
    assert!(matches!(
        err,
        CheckError::EntryCountMismatch {
            expected: 7,
            actual: 8
        }
    ));
}

#[test]
fn id_token_without_account_fails_verification() {
    let entries: Vec<_> = scenario_a()
        .into_iter()
        .filter(|(k, _)| !k.ends_with(TENANT))
        .collect();
    let snapshot = StorageSnapshot::new(StorageKind::Local, entries);

    let err = TokenStoreExpectation::default().verify(&snapshot).unwrap_err();
    assert!(matches!(err, CheckError::MissingAccount { .. }));
}

#[tokio::test]
async fn verify_token_store_reads_requested_medium() {
    let storage = MemoryStorage::new();
    for (k, v) in scenario_a() {
        storage.set_item(StorageKind::Session, &k, &v);
    }

    let expectation = TokenStoreExpectation::default()
        .with_scopes(["User.Read"])
        .with_total_entries(7);

    let inv = verify_token_store(
        &storage,
        StorageKind::Session,
        Duration::from_secs(5),
        &expectation,
    )
    .await
    .unwrap();
    assert_eq!(inv.storage, StorageKind::Session);

    let err = verify_token_store(&storage, StorageKind::Local, Duration::from_secs(5), &expectation)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckError::CountMismatch {
            kind: TokenKind::IdTokens,
            ..
        }
    ));
}
