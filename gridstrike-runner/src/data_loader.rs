//! Bar loading for the runner.
//!
//! Implements the fallback policy:
//! 1. Ask the market data source (CSV store, in-memory, ...) → use its bars
//! 2. If it has nothing for the window and `synthetic` is set → generate
//!    synthetic bars (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! Synthetic data is a developer-only mode. Results produced on synthetic
//! data carry `has_synthetic = true` all the way into exported artifacts.

use chrono::{DateTime, Utc};
use gridstrike_core::data::{dataset_hash, generate_synthetic_bars, DataError, MarketDataSource, Resolution};
use gridstrike_core::domain::{Bar, DatasetHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data for '{symbol}' between {start} and {end} (use --synthetic for synthetic data)")]
    NoData {
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("prefetch task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Generate synthetic bars when the source has nothing for the window.
    pub synthetic: bool,
}

/// Provenance of a loaded bar series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum DataOrigin {
    /// Named market data source.
    Source(String),
    Synthetic,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::Source(name) => write!(f, "{name}"),
            DataOrigin::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Bars for one symbol plus their provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub origin: DataOrigin,
    pub dataset_hash: DatasetHash,
    pub has_synthetic: bool,
}

pub fn load_bars(
    source: &dyn MarketDataSource,
    symbol: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    opts: LoadOptions,
) -> Result<LoadedData, LoadError> {
    match source.fetch(symbol, start, end, resolution) {
        Ok(bars) => {
            info!(symbol, source = source.name(), bars = bars.len(), "loaded bars");
            Ok(LoadedData {
                symbol: symbol.to_string(),
                dataset_hash: dataset_hash(symbol, &bars),
                bars,
                origin: DataOrigin::Source(source.name().to_string()),
                has_synthetic: false,
            })
        }
        Err(DataError::DataUnavailable { .. }) if opts.synthetic => {
            warn!(symbol, "generating synthetic data, results will be tagged as synthetic");
            let bars = generate_synthetic_bars(symbol, start, end, resolution)?;
            if bars.is_empty() {
                return Err(LoadError::NoData {
                    symbol: symbol.to_string(),
                    start,
                    end,
                });
            }
            Ok(LoadedData {
                symbol: symbol.to_string(),
                dataset_hash: dataset_hash(symbol, &bars),
                bars,
                origin: DataOrigin::Synthetic,
                has_synthetic: true,
            })
        }
        Err(DataError::DataUnavailable { .. }) => Err(LoadError::NoData {
            symbol: symbol.to_string(),
            start,
            end,
        }),
        Err(e) => Err(e.into()),
    }
}

/// [`load_bars`] on a blocking worker, so bars can be fetched ahead of a run.
pub async fn prefetch(
    source: Arc<dyn MarketDataSource>,
    symbol: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    opts: LoadOptions,
) -> Result<LoadedData, LoadError> {
    tokio::task::spawn_blocking(move || load_bars(source.as_ref(), &symbol, start, end, resolution, opts))
        .await
        .map_err(|e| LoadError::Join(e.to_string()))?
}
