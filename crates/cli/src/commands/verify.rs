//! Verify Command

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use cachecheck_common::{StorageKind, TokenCounts, TokenInventory, TokenStoreExpectation};

use super::inspect::{load_snapshot, SummaryDisplay};
use crate::output::{print_item, print_success, OutputFormat};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Exported storage snapshot (JSON object or array of [key, value] pairs)
    pub snapshot: PathBuf,

    /// Expected number of id tokens
    #[arg(long, default_value_t = 1)]
    pub id_tokens: usize,

    /// Expected number of access tokens
    #[arg(long, default_value_t = 1)]
    pub access_tokens: usize,

    /// Expected number of refresh tokens
    #[arg(long, default_value_t = 1)]
    pub refresh_tokens: usize,

    /// Scope some access token must cover (repeatable)
    #[arg(long = "scope")]
    pub scopes: Vec<String>,

    /// Expected total number of storage entries
    #[arg(long)]
    pub total: Option<usize>,

    /// Require an account entry for every token, not only id tokens
    #[arg(long)]
    pub linked_accounts: bool,
}

impl VerifyArgs {
    pub fn expectation(&self) -> TokenStoreExpectation {
        let mut expectation = TokenStoreExpectation::new(TokenCounts::new(
            self.id_tokens,
            self.access_tokens,
            self.refresh_tokens,
        ))
        .with_scopes(&self.scopes);
        if let Some(total) = self.total {
            expectation = expectation.with_total_entries(total);
        }
        if self.linked_accounts {
            expectation = expectation.with_linked_accounts();
        }
        expectation
    }
}

/// Load and verify a snapshot file
pub fn run(args: &VerifyArgs, storage: StorageKind) -> Result<TokenInventory> {
    let snapshot = load_snapshot(&args.snapshot, storage)?;
    let inventory = args
        .expectation()
        .verify(&snapshot)
        .with_context(|| format!("{} failed verification", args.snapshot.display()))?;
    info!(
        path = %args.snapshot.display(),
        entries = inventory.total_entry_count(),
        "Snapshot verified"
    );
    Ok(inventory)
}

pub fn execute(args: VerifyArgs, storage: StorageKind, format: OutputFormat) -> Result<()> {
    let inventory = run(&args, storage)?;

    if !format.is_structured() {
        print_success(&format!(
            "{} matches the expected token store",
            args.snapshot.display()
        ));
    }
    print_item(&SummaryDisplay::from(&inventory), format)
}
