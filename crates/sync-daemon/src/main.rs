//! sync-daemon: Headless batch sync between a Todoist-style service and a
//! markdown vault.
//!
//! Runs the sync-core engine as a native binary. The remote side is a
//! captured snapshot file (dry-run client); maintenance subcommands cover
//! signature repair, uuid back-fill, and index scans.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sync_daemon::native_fs::NativeFs;
use sync_daemon::snapshot_client::SnapshotFileClient;

use sync_core::backfill;
use sync_core::props::repair_signature_lines;
use sync_core::reconciler::Reconciler;
use sync_core::settings::Settings;
use sync_core::vault::Vault;
use sync_core::VaultIndex;

#[derive(Parser, Debug)]
#[command(name = "sync-daemon")]
#[command(about = "Todoist vault sync daemon")]
struct Args {
    /// Path to the vault directory
    #[arg(short, long)]
    vault: PathBuf,

    /// Path to a settings YAML file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconciler against a captured snapshot file
    Sync {
        /// Path to a snapshot JSON file
        #[arg(long)]
        snapshot: PathBuf,

        /// Repeat every N seconds instead of running once
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Repair malformed signature lines across the vault
    Repair,
    /// Assign a vault uuid to every managed note lacking one
    Backfill,
    /// Build the vault index and report what it finds
    Scan,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,sync_daemon=debug"
    } else {
        "info,sync_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings(args.config.as_deref())?;
    info!("Vault path: {:?}", args.vault);

    let fs = NativeFs::new(args.vault.clone());
    let mut vault = Vault::new(fs);

    match args.command {
        Command::Sync { snapshot, interval } => {
            let client = SnapshotFileClient::load(&snapshot)?;
            run_sync(&mut vault, &client, &settings, interval).await?;
        }
        Command::Repair => {
            let mut repaired = 0;
            for path in vault.list_markdown_files().await? {
                if vault
                    .process_raw(&path, |raw| repair_signature_lines(raw, &settings.props))
                    .await?
                {
                    info!("Repaired {}", path);
                    repaired += 1;
                }
            }
            info!("Repaired {} file(s)", repaired);
        }
        Command::Backfill => {
            let assigned = backfill::assign_missing_uuids(&mut vault, &settings.props).await?;
            info!("Assigned {} vault uuid(s)", assigned);
        }
        Command::Scan => {
            let index = VaultIndex::build(&mut vault, &settings.props).await?;
            info!(
                tasks = index.tasks.len(),
                projects = index.projects.len(),
                sections = index.sections.len(),
                pending = index.pending.len(),
                "Vault index built"
            );
            if !index.duplicate_task_ids.is_empty() {
                warn!(
                    "Duplicate remote task ids: {}",
                    index.duplicate_task_ids.join(", ")
                );
            }
        }
    }

    Ok(())
}

fn load_settings(path: Option<&std::path::Path>) -> Result<Settings> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&raw)?)
        }
        None => Ok(Settings::default()),
    }
}

/// Run the reconciler once, or on an interval until Ctrl+C.
///
/// Runs are strictly serial on this single-threaded loop, so at most one is
/// ever in flight; ticks that land while a run executes are skipped rather
/// than stacked.
async fn run_sync(
    vault: &mut Vault<NativeFs>,
    client: &SnapshotFileClient,
    settings: &Settings,
    interval: Option<u64>,
) -> Result<()> {
    let Some(seconds) = interval else {
        run_once(vault, client, settings).await;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("Syncing every {}s. Press Ctrl+C to stop.", seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_once(vault, client, settings).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

async fn run_once(vault: &mut Vault<NativeFs>, client: &SnapshotFileClient, settings: &Settings) {
    let mut reconciler = Reconciler::new(vault, client, settings);
    match reconciler.run(Utc::now()).await {
        Ok(summary) => {
            info!(
                "Run finished: {} created, {} updated, {} imported, {} missing-handled, {} errors",
                summary.created_remote,
                summary.updated_remote,
                summary.imported_new + summary.imported_updated,
                summary.missing_handled,
                summary.errors
            );
        }
        Err(e) => {
            warn!("Sync run aborted: {}", e);
        }
    }
}
