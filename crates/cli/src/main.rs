//! cachecheck CLI - Main Entry Point
//!
//! Classifies and verifies MSAL browser token caches exported as JSON.

use clap::{Parser, Subcommand};

use cachecheck_cli::commands::{inspect, verify};
use cachecheck_cli::output::{self, print_error};
use cachecheck_common::StorageKind;

/// cachecheck - MSAL browser token cache checker
#[derive(Parser)]
#[command(name = "cachecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Storage medium the snapshot was exported from (local, session)
    #[arg(long, default_value = "local", global = true)]
    storage: StorageKind,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every entry of a snapshot
    Inspect(inspect::InspectArgs),

    /// Check a snapshot against expected token counts, scopes and size
    Verify(verify::VerifyArgs),

    /// Show version information
    Version,
}

/// Filter used when `RUST_LOG` is unset
fn log_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level(cli.verbose))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Inspect(args) => inspect::execute(args, cli.storage, cli.format),
        Commands::Verify(args) => verify::execute(args, cli.storage, cli.format),
        Commands::Version => {
            println!("cachecheck v{}", env!("CARGO_PKG_VERSION"));
            println!("checker v{}", cachecheck_common::VERSION);
            Ok(())
        }
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
