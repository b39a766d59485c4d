//! Batch runs over a directory of configs.
//!
//! Every config is an independent backtest, so runs fan out across the
//! rayon pool. Each run is still strictly sequential bar by bar. A bad
//! config or a failed run is recorded against its file and the rest of the
//! batch carries on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{info, warn};

use gridstrike_core::config::GridConfig;
use gridstrike_core::data::{MarketDataSource, Resolution};
use gridstrike_core::engine::{BacktesterKind, CancelHandle};

use crate::config::ConfigLoader;
use crate::runner::{run_blocking, BacktestResult, RunError, RunRequest};

/// Window and run options shared by every config in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
    pub trade_cost: Option<Decimal>,
    pub backtester: BacktesterKind,
    pub synthetic: bool,
}

impl BatchRequest {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, resolution: Resolution) -> Self {
        Self {
            start,
            end,
            resolution,
            trade_cost: None,
            backtester: BacktesterKind::default(),
            synthetic: false,
        }
    }

    pub fn request_for(&self, config: GridConfig) -> RunRequest {
        RunRequest {
            config,
            start: self.start,
            end: self.end,
            resolution: self.resolution,
            trade_cost: self.trade_cost,
            backtester: self.backtester,
            synthetic: self.synthetic,
        }
    }
}

#[derive(Debug)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub outcome: Result<BacktestResult, RunError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per config file, in file-name order.
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&Path, &BacktestResult)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().ok().map(|r| (e.path.as_path(), r)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Path, &RunError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (e.path.as_path(), err)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run every config in `dir`. Only a failure to list the directory is fatal.
pub fn run_batch(
    dir: &Path,
    batch: &BatchRequest,
    source: &dyn MarketDataSource,
    cancel: &CancelHandle,
) -> Result<BatchReport, RunError> {
    let paths = ConfigLoader::list(dir)?;
    info!(dir = %dir.display(), configs = paths.len(), "starting batch");

    let entries: Vec<BatchEntry> = paths
        .into_par_iter()
        .map(|path| {
            let outcome = ConfigLoader::load(&path)
                .map_err(RunError::from)
                .and_then(|config| run_blocking(&batch.request_for(config), source, cancel));
            if let Err(e) = &outcome {
                warn!(path = %path.display(), error = %e, "batch entry failed");
            }
            BatchEntry { path, outcome }
        })
        .collect();

    let report = BatchReport { entries };
    info!(
        ok = report.succeeded().count(),
        failed = report.failed().count(),
        "batch complete"
    );
    Ok(report)
}

/// [`run_batch`] on a blocking worker.
pub async fn run_batch_async(
    dir: PathBuf,
    batch: BatchRequest,
    source: Arc<dyn MarketDataSource>,
    cancel: CancelHandle,
) -> Result<BatchReport, RunError> {
    tokio::task::spawn_blocking(move || run_batch(&dir, &batch, source.as_ref(), &cancel))
        .await
        .map_err(|e| RunError::Join(e.to_string()))?
}
