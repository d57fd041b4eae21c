use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use cachecheck_cli::commands::inspect::{load_snapshot, InspectReport};
use cachecheck_cli::commands::verify::{self, VerifyArgs};
use cachecheck_common::{classify, CheckError, StorageKind, TokenKind};

const HOME: &str = "uid.utid";
const ENV: &str = "login.windows.net";

fn exported_cache() -> serde_json::Value {
    let mut cache = serde_json::Map::new();
    let mut put = |key: String, value: serde_json::Value| {
        cache.insert(key, serde_json::Value::String(value.to_string()));
    };
    put(
        format!("{HOME}-{ENV}-idtoken-client-common-"),
        serde_json::json!({"homeAccountId": HOME, "environment": ENV,
            "credentialType": "IdToken", "clientId": "client", "realm": "common"}),
    );
    put(
        format!("{HOME}-{ENV}-accesstoken-client-common-openid profile user.read--"),
        serde_json::json!({"homeAccountId": HOME, "environment": ENV,
            "credentialType": "AccessToken", "clientId": "client", "realm": "common",
            "target": "openid profile User.Read", "expiresOn": 1690003600}),
    );
    put(
        format!("{HOME}-{ENV}-refreshtoken-client--"),
        serde_json::json!({"homeAccountId": HOME, "environment": ENV,
            "credentialType": "RefreshToken", "clientId": "client"}),
    );
    put(
        format!("{HOME}-{ENV}-common"),
        serde_json::json!({"homeAccountId": HOME, "environment": ENV, "realm": "common",
            "username": "user@contoso.com"}),
    );
    put(
        "msal.account.keys".to_string(),
        serde_json::json!([format!("{HOME}-{ENV}-common")]),
    );
    serde_json::Value::Object(cache)
}

fn write_snapshot(value: &serde_json::Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(value.to_string().as_bytes()).unwrap();
    file
}

fn verify_args(snapshot: PathBuf) -> VerifyArgs {
    VerifyArgs {
        snapshot,
        id_tokens: 1,
        access_tokens: 1,
        refresh_tokens: 1,
        scopes: vec!["User.Read".to_string()],
        total: Some(5),
        linked_accounts: true,
    }
}

#[test]
fn inspect_report_lists_every_entry() {
    let file = write_snapshot(&exported_cache());
    let snapshot = load_snapshot(file.path(), StorageKind::Local).unwrap();
    let report = InspectReport::from(&classify(&snapshot));

    assert_eq!(report.entries.len(), 4);
    assert_eq!(report.entries[0].kind, "IdToken");
    assert_eq!(report.entries[1].scopes, "openid profile user.read");
    assert_eq!(report.entries[3].kind, "Account");
    assert_eq!(report.unclassified.len(), 1);
    assert_eq!(report.unclassified[0].kind, "internal");
    assert_eq!(report.summary.total, 5);
}

#[test]
fn verify_accepts_matching_snapshot() {
    let file = write_snapshot(&exported_cache());
    let inventory =
        verify::run(&verify_args(file.path().to_path_buf()), StorageKind::Local).unwrap();
    assert_eq!(inventory.accounts.len(), 1);
}

#[test]
fn verify_reports_missing_refresh_token() {
    let mut cache = exported_cache();
    cache
        .as_object_mut()
        .unwrap()
        .remove(&format!("{HOME}-{ENV}-refreshtoken-client--"));
    let file = write_snapshot(&cache);

    let err = verify::run(&verify_args(file.path().to_path_buf()), StorageKind::Local).unwrap_err();
    match err.downcast_ref::<CheckError>() {
        Some(CheckError::CountMismatch { kind, expected, actual }) => {
            assert_eq!(*kind, TokenKind::RefreshTokens);
            assert_eq!((*expected, *actual), (1, 0));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn verify_rejects_uncovered_scope() {
    let file = write_snapshot(&exported_cache());
    let mut args = verify_args(file.path().to_path_buf());
    args.scopes.push("Mail.Read".to_string());

    let err = verify::run(&args, StorageKind::Local).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CheckError>(),
        Some(CheckError::ScopesNotCovered { .. })
    ));
}

/// Log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn verify_logs_snapshot_path_and_entry_count() {
    let file = write_snapshot(&exported_cache());
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        verify::run(&verify_args(file.path().to_path_buf()), StorageKind::Local).unwrap();
    });

    let output = logs.contents();
    assert!(output.contains("Loading snapshot"), "{output}");
    assert!(output.contains("Snapshot loaded"), "{output}");
    assert!(output.contains("entries=5"), "{output}");
    assert!(output.contains("Snapshot verified"), "{output}");
    assert!(output.contains(&file.path().display().to_string()), "{output}");
}

#[test]
fn malformed_snapshot_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"not json").unwrap();
    assert!(load_snapshot(file.path(), StorageKind::Session).is_err());
}
