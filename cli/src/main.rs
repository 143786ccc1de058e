//! coinsync CLI — run the transfer sync engine and query what it stored.
//!
//! # Commands
//! ```text
//! coinsync run
//! coinsync sync
//! coinsync backfill --from <N> --to <M>
//! coinsync history  --address <A> [--limit L] [--offset O]
//! coinsync tx       --digest <D>
//! coinsync stats    [--weekly | --all | --from <RFC3339> --to <RFC3339>]
//! coinsync info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use coinsync_core::{EventStore, SyncConfig, TransferService};
use coinsync_storage::postgres::PostgresOptions;
use coinsync_storage::{PostgresEventStore, SqliteEventStore};
use coinsync_sui::{SuiClientConfig, SuiLedgerClient};

mod config;
mod logging;

use config::{AppConfig, DatabaseSection};

#[derive(Parser)]
#[command(
    name = "coinsync",
    about = "Sync and query transfer events of a single Sui coin",
    long_about = "
coinsync walks Sui checkpoints (or address listings), classifies every balance
change of the configured coin and stores the resulting events in SQLite or
PostgreSQL.

ENVIRONMENT VARIABLES:
  COINSYNC_RPC_URL        Overrides [ledger].rpc_url
  COINSYNC_DATABASE_URL   Overrides [database].url
  RUST_LOG                Overrides the [logging] filter
",
    version
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "coinsync.toml")]
    config: PathBuf,

    /// Force debug logging for coinsync components
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync periodically until Ctrl-C
    Run,

    /// Run one sync pass and print its outcome
    Sync,

    /// Re-drive an explicit checkpoint range
    Backfill {
        /// First checkpoint (inclusive)
        #[arg(long)]
        from: u64,
        /// Last checkpoint (inclusive)
        #[arg(long)]
        to: u64,
    },

    /// Events sent or received by an address, newest first
    History {
        #[arg(long)]
        address: String,
        /// Page size (0 = configured default)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// All stored events of one transaction
    Tx {
        #[arg(long)]
        digest: String,
    },

    /// Aggregate statistics (defaults to the trailing seven days)
    Stats {
        #[arg(long, conflicts_with_all = ["all", "from", "to"])]
        weekly: bool,
        #[arg(long, conflicts_with_all = ["from", "to"])]
        all: bool,
        /// Window start (RFC 3339), requires --to
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Window end (RFC 3339, exclusive), requires --from
        #[arg(long, requires = "from")]
        to: Option<String>,
    },

    /// Show the resolved configuration and the stored watermark
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let app = AppConfig::load(&cli.config)?;
    logging::init_tracing(&app.logging, cli.debug);

    let service = build_service(&app).await?;
    let cancel = shutdown_token();

    match cli.command {
        Commands::Run => cmd_run(&service, &app, cancel).await,
        Commands::Sync => print_json(&service.sync(&cancel).await?),
        Commands::Backfill { from, to } => print_json(&service.backfill(from, to, &cancel).await?),
        Commands::History { address, limit, offset } => {
            print_json(&service.get_by_address(&address, limit, offset).await?)
        }
        Commands::Tx { digest } => print_json(&service.get_by_digest(&digest).await?),
        Commands::Stats { weekly: _, all, from, to } => {
            let stats = match (from, to) {
                (Some(from), Some(to)) => {
                    service
                        .window_statistics(parse_time(&from)?, parse_time(&to)?)
                        .await?
                }
                _ if all => service.all_time_statistics().await?,
                _ => service.weekly_statistics().await?,
            };
            print_json(&stats)
        }
        Commands::Info => cmd_info(&service, &app).await,
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

async fn build_service(app: &AppConfig) -> Result<TransferService> {
    let store = open_store(&app.database).await?;

    let ledger = SuiLedgerClient::new(SuiClientConfig {
        rpc_url: app.ledger.rpc_url.clone(),
        request_timeout: Duration::from_secs(app.ledger.request_timeout_secs),
        max_retries: app.ledger.max_retries,
    })
    .context("building Sui client")?;

    TransferService::new(Arc::new(app.sync.clone()), Arc::new(ledger), store)
        .context("building transfer service")
}

async fn open_store(db: &DatabaseSection) -> Result<Arc<dyn EventStore>> {
    if db.is_postgres() {
        let opts = PostgresOptions {
            max_connections: db.max_connections,
            ..Default::default()
        };
        let store = PostgresEventStore::connect_with_options(&db.url, opts)
            .await
            .context("connecting to PostgreSQL")?;
        tracing::info!(backend = "postgres", "storage ready");
        Ok(Arc::new(store))
    } else {
        let store = SqliteEventStore::open_with(&db.url, db.max_connections)
            .await
            .with_context(|| format!("opening SQLite database {}", db.url))?;
        tracing::info!(backend = "sqlite", path = %db.url, "storage ready");
        Ok(Arc::new(store))
    }
}

/// A token cancelled on the first Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            trigger.cancel();
        }
    });
    cancel
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(service: &TransferService, app: &AppConfig, cancel: CancellationToken) -> Result<()> {
    tracing::info!(
        mode = %app.sync.mode,
        interval_secs = app.schedule.interval_secs,
        coin_type = %app.sync.asset.coin_type,
        "starting periodic sync"
    );
    service
        .orchestrator()
        .run_periodic(app.schedule.interval(), app.schedule.run_on_start, cancel)
        .await;
    tracing::info!("periodic sync stopped");
    Ok(())
}

#[derive(Serialize)]
struct InfoReport<'a> {
    version: &'static str,
    rpc_url: &'a str,
    storage: &'static str,
    sync: &'a SyncConfig,
    interval_secs: u64,
    watermark: u64,
    stored_events: u64,
}

async fn cmd_info(service: &TransferService, app: &AppConfig) -> Result<()> {
    let report = InfoReport {
        version: env!("CARGO_PKG_VERSION"),
        rpc_url: &app.ledger.rpc_url,
        storage: if app.database.is_postgres() { "postgres" } else { "sqlite" },
        sync: &app.sync,
        interval_secs: app.schedule.interval_secs,
        watermark: service.watermark().await?,
        stored_events: service.event_count().await?,
    };
    print_json(&report)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("'{s}' is not an RFC 3339 timestamp"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
