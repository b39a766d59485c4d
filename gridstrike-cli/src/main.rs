//! GridStrike CLI: run grid-strike backtests and manage the local bar store.
//!
//! Commands:
//! - `list`: show the strategy configs in a directory
//! - `run`: execute one backtest from a YAML/TOML config
//! - `batch`: run every config in a directory in parallel
//! - `resample`: turn a symbol's trades.csv into a stored bar series
//! - `store status`: report stored symbols, resolutions and ranges

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::warn;

use gridstrike_core::config::SpacingType;
use gridstrike_core::data::{MarketDataSource, Resolution};
use gridstrike_core::engine::{BacktesterKind, CancelHandle};
use gridstrike_core::report::ResultsReport;
use gridstrike_runner::{
    run, run_batch_async, save_artifacts, BacktestResult, BatchRequest, ConfigLoader, CsvBarStore,
};

#[derive(Parser)]
#[command(name = "gridstrike", about = "GridStrike CLI — grid strategy backtesting engine")]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List strategy configs (*.yml, *.yaml, *.toml) in a directory.
    List {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Execute a backtest from a config file.
    Run {
        /// Path to a YAML or TOML config file.
        #[arg(long)]
        config: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },
    /// Run every config in a directory.
    Batch {
        #[arg(long)]
        dir: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },
    /// Resample a symbol's trades.csv into stored bars.
    Resample {
        #[arg(long)]
        symbol: String,

        #[arg(long)]
        resolution: Resolution,

        /// Bar store directory.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Bar store management commands.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Report stored symbols, resolutions and ranges.
    Status {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[derive(Args)]
struct RunOpts {
    /// Window start: Unix seconds or RFC 3339.
    #[arg(long, value_parser = parse_time)]
    start: DateTime<Utc>,

    /// Window end (inclusive): Unix seconds or RFC 3339.
    #[arg(long, value_parser = parse_time)]
    end: DateTime<Utc>,

    /// Bar resolution, e.g. 1m, 3m, 1h.
    #[arg(long, default_value = "3m")]
    resolution: Resolution,

    /// Trading cost rate, overriding the config's trading_cost_rate.
    #[arg(long)]
    trade_cost: Option<Decimal>,

    #[arg(long, default_value = "grid_strike")]
    backtester: BacktesterKind,

    /// Bar store directory.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Use synthetic data when the store has none.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Output directory for artifacts.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

impl RunOpts {
    fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            start: self.start,
            end: self.end,
            resolution: self.resolution,
            trade_cost: self.trade_cost,
            backtester: self.backtester,
            synthetic: self.synthetic,
        }
    }

    fn source(&self) -> Arc<dyn MarketDataSource> {
        Arc::new(CsvBarStore::new(&self.data_dir))
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("timestamp {secs} out of range"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected Unix seconds or RFC 3339, got '{s}': {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gridstrike_runner::logging::init(cli.verbose);

    match cli.command {
        Commands::List { dir } => run_list(&dir),
        Commands::Run { config, opts } => run_backtest_cmd(&config, opts).await,
        Commands::Batch { dir, opts } => run_batch_cmd(dir, opts).await,
        Commands::Resample {
            symbol,
            resolution,
            data_dir,
        } => run_resample(&symbol, resolution, &data_dir),
        Commands::Store { action } => match action {
            StoreAction::Status { data_dir } => run_store_status(&data_dir),
        },
    }
}

/// Cancel handle tripped by Ctrl-C. The engine stops between bars.
fn cancel_on_ctrl_c() -> CancelHandle {
    let cancel = CancelHandle::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current bar");
            handle.cancel();
        }
    });
    cancel
}

fn run_list(dir: &Path) -> Result<()> {
    let paths = ConfigLoader::list(dir)?;
    if paths.is_empty() {
        println!("No configs in {}", dir.display());
        return Ok(());
    }
    println!("{:<28} {:<12} {:<12} {:>8} {:>8}", "File", "Symbol", "Spacing", "Levels", "Size");
    println!("{}", "-".repeat(72));
    for path in &paths {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match ConfigLoader::load(path) {
            Ok(c) => {
                let spacing = match c.spacing_type {
                    SpacingType::Absolute => format!("±{}", c.spacing_value),
                    SpacingType::Percentage => format!("±{}%", c.spacing_value * Decimal::ONE_HUNDRED),
                };
                println!(
                    "{:<28} {:<12} {:<12} {:>8} {:>8}",
                    name, c.symbol, spacing, c.levels_per_side, c.order_size
                );
            }
            Err(e) => println!("{name:<28} INVALID: {e}"),
        }
    }
    Ok(())
}

async fn run_backtest_cmd(config_path: &Path, opts: RunOpts) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let request = opts.batch_request().request_for(config);

    let outcome = run(request, opts.source(), cancel_on_ctrl_c()).await;
    let result = match outcome {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => {
            eprintln!("Run cancelled: {e}");
            std::process::exit(130);
        }
        Err(e) => return Err(e).context("backtest failed"),
    };

    print_summary(&result);

    let run_dir = save_artifacts(&result, &opts.output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

async fn run_batch_cmd(dir: PathBuf, opts: RunOpts) -> Result<()> {
    let report = run_batch_async(dir, opts.batch_request(), opts.source(), cancel_on_ctrl_c()).await?;

    println!(
        "{:<28} {:<12} {:>14} {:>10} {:>8}  {}",
        "File", "Symbol", "Final Equity", "Return", "Fills", "Artifacts"
    );
    println!("{}", "-".repeat(96));
    for (path, result) in report.succeeded() {
        let s = result.summary();
        let run_dir = save_artifacts(result, &opts.output_dir)?;
        println!(
            "{:<28} {:<12} {:>14} {:>9.2}% {:>8}  {}",
            file_label(path),
            result.symbol(),
            s.final_equity.round_dp(2),
            s.total_return_pct,
            s.fill_count,
            run_dir.display()
        );
    }

    let failures: Vec<_> = report.failed().collect();
    for (path, err) in &failures {
        eprintln!("FAILED {}: {err}", file_label(path));
    }
    if !failures.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_resample(symbol: &str, resolution: Resolution, data_dir: &Path) -> Result<()> {
    let store = CsvBarStore::new(data_dir);
    let meta = store
        .resample_and_store(symbol, resolution)
        .with_context(|| format!("failed to resample trades for {symbol}"))?;
    println!(
        "Stored {} {} bars for {} ({} to {})",
        meta.bar_count, resolution, symbol, meta.first, meta.last
    );
    Ok(())
}

fn run_store_status(data_dir: &Path) -> Result<()> {
    let store = CsvBarStore::new(data_dir);
    let symbols = store.status()?;
    if symbols.is_empty() {
        println!("Store is empty: {}", data_dir.display());
        return Ok(());
    }

    println!("Store: {}", data_dir.display());
    println!("Symbols: {}", symbols.len());
    println!();
    println!("{:<12} {:<6} {:>8}  {:<45} {}", "Symbol", "Res", "Bars", "Range", "Source");
    println!("{}", "-".repeat(84));
    for meta in &symbols {
        for series in meta.series.values() {
            println!(
                "{:<12} {:<6} {:>8}  {:<45} {}",
                meta.symbol,
                series.resolution.to_string(),
                series.bar_count,
                format!("{} to {}", series.first, series.last),
                series.source
            );
        }
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    println!("{}", ResultsReport::new(&result.result).render());
    println!();
    println!("Run ID:         {}", result.run_id.short());
    println!("Config Hash:    {}", result.config_hash);
    println!("Dataset Hash:   {}", result.dataset_hash);
    println!("Data Source:    {}", result.metadata.data_origin);
    if result.metadata.has_synthetic {
        println!();
        println!("WARNING: results use SYNTHETIC data and do not reflect real market history");
    }
}
