//! # corpus-sync CLI (`csync`)
//!
//! The `csync` binary runs synchronization passes from a help center into a
//! vector store and inspects the fingerprint database between passes.
//!
//! ## Usage
//!
//! ```bash
//! csync --config ./config/csync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csync init` | Create the SQLite database and run schema migrations |
//! | `csync sync` | Run one synchronization pass |
//! | `csync sync --dry-run` | Print the planned operations without mutating anything |
//! | `csync fingerprints` | List stored fingerprints |
//! | `csync verify` | Compare the remote listing with stored fingerprints |
//!
//! ## Exit Status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Pass completed, no failed operations |
//! | 1 | Pass completed, some operations failed (or `verify` found drift) |
//! | 2 | Aborted: configuration, source or fingerprint store error |
//! | 130 | Cancelled (Ctrl-C) at a stage boundary |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`), so
//! stdout stays parseable with `--json`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use corpus_sync::ingest::SyncStatus;
use corpus_sync::{config, fingerprints, ingest, migrate, verify};

/// corpus-sync CLI: incremental help-center to vector-store synchronization.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/csync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "csync",
    about = "Incrementally synchronize a help-center corpus into a vector store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/csync.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the fingerprint database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Run one synchronization pass.
    ///
    /// Fetches the content tree, diffs it against the stored fingerprints
    /// and applies creates, updates and deletes to the remote store.
    Sync {
        /// Print the planned operations without touching the remote or
        /// the fingerprint store.
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored fingerprints.
    Fingerprints {
        #[arg(long)]
        json: bool,
    },

    /// Check for drift between the remote store and the fingerprints.
    Verify {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Flip the returned channel to `true` on the first Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current stage");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn run(cli: Cli) -> anyhow::Result<SyncStatus> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            Ok(SyncStatus::Clean)
        }
        Commands::Sync { dry_run, json } => {
            ingest::run_sync(&cfg, dry_run, json, cancel_on_ctrl_c()).await
        }
        Commands::Fingerprints { json } => {
            fingerprints::run_fingerprints(&cfg, json).await?;
            Ok(SyncStatus::Clean)
        }
        Commands::Verify { json } => {
            if verify::run_verify(&cfg, json).await? {
                Ok(SyncStatus::Clean)
            } else {
                Ok(SyncStatus::Failed)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(status) => ExitCode::from(status.code()),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(SyncStatus::Aborted.code())
        }
    }
}
