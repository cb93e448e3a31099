use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use explorer_data::{RecordSink, Store};
use explorer_sync::{Backfill, BackfillReport, SyncConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "explorer")]
#[command(about = "Backfills blocks, transactions, logs and NFT transfers into SQLite")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[arg(long, global = true, env = "EXPLORER_DB_PATH", default_value = "data/explorer.sqlite")]
    db_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync an inclusive block interval from the node.
    Sync(SyncArgs),
    /// Show stored row counts.
    Status,
}

#[derive(Args, Debug)]
struct SyncArgs {
    #[arg(long)]
    start_block: u64,

    /// Last block to sync (inclusive).
    #[arg(long)]
    end_block: u64,

    #[arg(long, env = "EXPLORER_RPC_URL")]
    rpc_url: String,

    #[arg(long, env = "EXPLORER_WORKERS", default_value_t = 32)]
    workers: usize,

    /// Blocks per sync job.
    #[arg(long, env = "EXPLORER_RANGE_SIZE", default_value_t = 100)]
    range_size: u64,

    /// Calls per RPC batch request.
    #[arg(long, env = "EXPLORER_STEP", default_value_t = 1000)]
    step: usize,

    #[arg(long, env = "EXPLORER_BATCH_TIMEOUT_SECS", default_value_t = 30)]
    batch_timeout_secs: u64,

    /// Re-sends of a batch after transport failures.
    #[arg(long, env = "EXPLORER_BATCH_RETRIES", default_value_t = 0)]
    batch_retries: u32,

    /// Maximum queued jobs; unbounded when omitted.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Skip log and NFT transfer decoding.
    #[arg(long)]
    no_logs: bool,

    /// Skip ranges whose blocks are already stored.
    #[arg(long)]
    skip_existing: bool,

    /// Output format for the final report: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

impl SyncArgs {
    fn to_config(&self) -> SyncConfig {
        SyncConfig {
            rpc_url: self.rpc_url.clone(),
            workers: self.workers,
            range_size: self.range_size,
            step: self.step,
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
            batch_retries: self.batch_retries,
            decode_logs: !self.no_logs,
            skip_existing: self.skip_existing,
            queue_capacity: self.queue_capacity,
            ..SyncConfig::default()
        }
    }

    /// No progress bar with JSON output.
    fn show_progress(&self) -> bool {
        self.output != "json"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Sync(args) => handle_sync(&cli.db_path, args).await,
        Commands::Status => handle_status(&cli.db_path),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn handle_sync(db_path: &str, args: SyncArgs) -> Result<()> {
    if args.start_block > args.end_block {
        return Err(eyre!(
            "invalid range: start-block {} is greater than end-block {}",
            args.start_block,
            args.end_block
        ));
    }
    if !matches!(args.output.as_str(), "table" | "json") {
        return Err(eyre!("unsupported output format '{}'", args.output));
    }

    ensure_parent_dir(db_path)?;
    let store: Arc<dyn RecordSink> = Arc::new(Store::new(db_path)?);
    let backfill =
        Backfill::from_config(args.to_config(), store)?.with_progress(args.show_progress());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight ranges");
            on_signal.cancel();
        }
    });

    info!(
        start = args.start_block,
        end = args.end_block,
        db = db_path,
        "sync started"
    );
    let report = backfill
        .run(args.start_block, args.end_block, cancel)
        .await?;

    if args.output == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(eyre!(
            "{} range(s) failed; re-run the command to retry them",
            report.failed.len()
        ))
    }
}

fn handle_status(db_path: &str) -> Result<()> {
    let store = Store::new(db_path)?;
    let counts = store.counts()?;
    let highest = store
        .max_block()?
        .map_or_else(|| "-".to_string(), |n| n.to_string());

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Table", "Rows"]);
    table.add_row(vec!["blocks".to_string(), counts.blocks.to_string()]);
    table.add_row(vec!["transactions".to_string(), counts.transactions.to_string()]);
    table.add_row(vec!["logs".to_string(), counts.logs.to_string()]);
    table.add_row(vec!["nft_transfers".to_string(), counts.nft_transfers.to_string()]);
    table.add_row(vec!["contracts".to_string(), counts.contracts.to_string()]);

    println!("Database: {db_path}");
    println!("Highest stored block: {highest}\n");
    println!("{table}");
    Ok(())
}

fn print_report(report: &BackfillReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Committed", "Skipped", "Failed", "Rows"]);
    table.add_row(vec![
        report.committed.len().to_string(),
        report.skipped.len().to_string(),
        report.failed.len().to_string(),
        report.rows.to_string(),
    ]);
    println!("{table}");

    if !report.failed.is_empty() {
        let mut failed = Table::new();
        failed.load_preset(UTF8_BORDERS_ONLY);
        failed.set_header(vec!["Range", "Reason"]);
        for (range, reason) in &report.failed {
            failed.add_row(vec![range.to_string(), reason.clone()]);
        }
        println!("\n{failed}");
    }
}

fn ensure_parent_dir(db_path: &str) -> Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}
