//! Inspect Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use cachecheck_common::{
    classify, AccountEntry, CredentialEntry, StorageKind, StorageSnapshot, TokenInventory,
};

use crate::output::{
    print_heading, print_item, print_list, render_document, OutputFormat, TableDisplay,
};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Exported storage snapshot (JSON object or array of [key, value] pairs)
    pub snapshot: PathBuf,
}

/// One classified entry
#[derive(Debug, Clone, Serialize)]
pub struct EntryDisplay {
    pub kind: String,
    pub home_account_id: String,
    pub environment: String,
    pub client_id: String,
    pub realm: String,
    pub scopes: String,
}

impl From<&CredentialEntry> for EntryDisplay {
    fn from(entry: &CredentialEntry) -> Self {
        Self {
            kind: entry.value.credential_type.clone(),
            home_account_id: entry.home_account_id().to_string(),
            environment: entry.value.environment.clone(),
            client_id: entry.value.client_id.clone(),
            realm: entry.value.realm.clone().unwrap_or_default(),
            scopes: entry.scopes().to_string(),
        }
    }
}

impl From<&AccountEntry> for EntryDisplay {
    fn from(entry: &AccountEntry) -> Self {
        Self {
            kind: "Account".to_string(),
            home_account_id: entry.home_account_id().to_string(),
            environment: entry.value.environment.clone(),
            client_id: String::new(),
            realm: entry.value.realm.clone(),
            scopes: String::new(),
        }
    }
}

impl TableDisplay for EntryDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Home Account", "Environment", "Client ID", "Realm", "Scopes"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.kind.clone(),
            self.home_account_id.clone(),
            self.environment.clone(),
            self.client_id.clone(),
            self.realm.clone(),
            self.scopes.clone(),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnclassifiedDisplay {
    pub key: String,
    pub kind: String,
}

impl TableDisplay for UnclassifiedDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Key", "Parsed As"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.key.clone(), self.kind.clone()]
    }
}

/// Bucket sizes of one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDisplay {
    pub storage: StorageKind,
    pub id_tokens: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
    pub accounts: usize,
    pub unclassified: usize,
    pub total: usize,
}

impl From<&TokenInventory> for SummaryDisplay {
    fn from(inventory: &TokenInventory) -> Self {
        Self {
            storage: inventory.storage,
            id_tokens: inventory.id_tokens.len(),
            access_tokens: inventory.access_tokens.len(),
            refresh_tokens: inventory.refresh_tokens.len(),
            accounts: inventory.accounts.len(),
            unclassified: inventory.unclassified.len(),
            total: inventory.total_entry_count(),
        }
    }
}

impl TableDisplay for SummaryDisplay {
    fn headers() -> Vec<&'static str> {
        vec![
            "Storage",
            "ID Tokens",
            "Access Tokens",
            "Refresh Tokens",
            "Accounts",
            "Unclassified",
            "Total",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.storage.to_string(),
            self.id_tokens.to_string(),
            self.access_tokens.to_string(),
            self.refresh_tokens.to_string(),
            self.accounts.to_string(),
            self.unclassified.to_string(),
            self.total.to_string(),
        ]
    }
}

/// Everything `inspect` reports, as one document
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub summary: SummaryDisplay,
    pub entries: Vec<EntryDisplay>,
    pub unclassified: Vec<UnclassifiedDisplay>,
}

impl From<&TokenInventory> for InspectReport {
    fn from(inventory: &TokenInventory) -> Self {
        let mut entries: Vec<EntryDisplay> =
            inventory.credentials().map(|(_, e)| EntryDisplay::from(e)).collect();
        entries.extend(inventory.accounts.iter().map(EntryDisplay::from));

        Self {
            summary: SummaryDisplay::from(inventory),
            entries,
            unclassified: inventory
                .unclassified
                .iter()
                .map(|u| UnclassifiedDisplay {
                    key: u.key.clone(),
                    kind: u.kind.to_string(),
                })
                .collect(),
        }
    }
}

/// Load a snapshot file as the given storage medium
pub fn load_snapshot(path: &std::path::Path, storage: StorageKind) -> Result<StorageSnapshot> {
    debug!(path = %path.display(), storage = %storage, "Loading snapshot");
    let snapshot = StorageSnapshot::from_file(storage, path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    debug!(entries = snapshot.total_entry_count(), "Snapshot loaded");
    Ok(snapshot)
}

pub fn execute(args: InspectArgs, storage: StorageKind, format: OutputFormat) -> Result<()> {
    let snapshot = load_snapshot(&args.snapshot, storage)?;
    let inventory = classify(&snapshot);
    let report = InspectReport::from(&inventory);
    info!(
        path = %args.snapshot.display(),
        classified = inventory.classified_count(),
        unclassified = inventory.unclassified_count(),
        "Classified snapshot"
    );

    if format.is_structured() {
        println!("{}", render_document(&report, format)?);
        return Ok(());
    }

    print_list(&report.entries, format)?;
    if !report.unclassified.is_empty() {
        print_heading("Unclassified");
        print_list(&report.unclassified, format)?;
    }
    print_heading("Summary");
    print_item(&report.summary, format)?;

    Ok(())
}
