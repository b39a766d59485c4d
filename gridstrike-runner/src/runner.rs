//! Backtest runner: wires together data loading, the engine and fingerprints.
//!
//! Entry points:
//! - `run_blocking()`: loads bars from a source, then runs on the calling thread.
//! - `run()`: the same, as one unit of suspension on a blocking worker.
//! - `run_on_data()`: takes pre-loaded bars. No I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use gridstrike_core::config::{ConfigError, GridConfig};
use gridstrike_core::data::{MarketDataSource, Resolution};
use gridstrike_core::domain::{ConfigHash, DatasetHash, RunId};
use gridstrike_core::engine::{run_backtest, BacktesterKind, CancelHandle, EngineError, RunResult, RunSummary};
use gridstrike_core::fingerprint::RunFingerprint;

use crate::config::LoadConfigError;
use crate::data_loader::{load_bars, DataOrigin, LoadError, LoadOptions, LoadedData};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    LoadConfig(#[from] LoadConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("run task failed: {0}")]
    Join(String),
}

impl RunError {
    /// True when the run stopped because its cancel handle fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Engine(EngineError::Cancelled { .. }))
    }
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything needed to start one backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub config: GridConfig,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
    /// Overrides `config.trading_cost_rate` when set.
    pub trade_cost: Option<Decimal>,
    pub backtester: BacktesterKind,
    /// Fall back to synthetic bars when the source has none.
    pub synthetic: bool,
}

impl RunRequest {
    pub fn new(config: GridConfig, start: DateTime<Utc>, end: DateTime<Utc>, resolution: Resolution) -> Self {
        Self {
            config,
            start,
            end,
            resolution,
            trade_cost: None,
            backtester: BacktesterKind::default(),
            synthetic: false,
        }
    }

    pub fn with_trade_cost(mut self, rate: Decimal) -> Self {
        self.trade_cost = Some(rate);
        self
    }

    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// The config the engine actually sees: validated, cost override applied.
    pub fn effective_config(&self) -> Result<GridConfig, ConfigError> {
        match self.trade_cost {
            Some(rate) => self.config.with_trading_cost(rate),
            None => {
                self.config.validate()?;
                Ok(self.config.clone())
            }
        }
    }

    fn check(&self) -> Result<GridConfig, RunError> {
        if self.start > self.end {
            return Err(RunError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(self.effective_config()?)
    }
}

/// Request parameters and data provenance recorded alongside a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
    pub backtester: BacktesterKind,
    /// Effective config, cost override applied.
    pub config: GridConfig,
    pub trade_cost_overridden: bool,
    pub data_origin: DataOrigin,
    pub has_synthetic: bool,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config_hash: ConfigHash,
    pub dataset_hash: DatasetHash,
    pub metadata: RunMetadata,
    pub result: RunResult,
}

impl BacktestResult {
    pub fn summary(&self) -> &RunSummary {
        self.result.summary()
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }
}

/// Run on pre-loaded bars: no I/O.
pub fn run_on_data(request: &RunRequest, loaded: LoadedData, cancel: &CancelHandle) -> Result<BacktestResult, RunError> {
    let config = request.check()?;
    let fingerprint = RunFingerprint::compute(&config, &loaded.bars, request.start, request.end);

    let result = run_backtest(
        &config,
        loaded.bars,
        request.start,
        request.end,
        request.resolution,
        request.backtester,
        cancel,
    )?;

    info!(
        run_id = fingerprint.run_id.short(),
        symbol = %config.symbol,
        fills = result.summary.fill_count,
        final_equity = %result.summary.final_equity,
        "run complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: fingerprint.run_id,
        config_hash: fingerprint.config_hash,
        dataset_hash: fingerprint.dataset_hash,
        metadata: RunMetadata {
            symbol: config.symbol.clone(),
            start: request.start,
            end: request.end,
            resolution: request.resolution,
            backtester: request.backtester,
            trade_cost_overridden: request.trade_cost.is_some(),
            config,
            data_origin: loaded.origin,
            has_synthetic: loaded.has_synthetic,
        },
        result,
    })
}

/// Load bars from `source` and run on the calling thread.
///
/// The config is validated before any data is fetched.
pub fn run_blocking(
    request: &RunRequest,
    source: &dyn MarketDataSource,
    cancel: &CancelHandle,
) -> Result<BacktestResult, RunError> {
    let config = request.check()?;
    info!(
        symbol = %config.symbol,
        start = %request.start,
        end = %request.end,
        resolution = %request.resolution,
        backtester = %request.backtester,
        "starting run"
    );
    let opts = LoadOptions {
        synthetic: request.synthetic,
    };
    let loaded = load_bars(source, &config.symbol, request.start, request.end, request.resolution, opts)?;
    run_on_data(request, loaded, cancel)
}

/// Asynchronous run. The whole backtest executes on a blocking worker and
/// is awaited as a single unit; `cancel` stops it between bars.
pub async fn run(
    request: RunRequest,
    source: Arc<dyn MarketDataSource>,
    cancel: CancelHandle,
) -> Result<BacktestResult, RunError> {
    tokio::task::spawn_blocking(move || run_blocking(&request, source.as_ref(), &cancel))
        .await
        .map_err(|e| RunError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstrike_core::config::SpacingType;
    use gridstrike_core::data::InMemorySource;
    use gridstrike_core::domain::Bar;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn request() -> RunRequest {
        let config = GridConfig::new("X", SpacingType::Absolute, dec!(5), 2, dec!(1));
        RunRequest::new(config, ts(0), ts(120), "1m".parse().unwrap())
    }

    fn source() -> InMemorySource {
        let bars = vec![
            Bar::flat(ts(0), dec!(100)),
            Bar {
                timestamp: ts(60),
                open: dec!(99),
                high: dec!(99),
                low: dec!(94),
                close: dec!(96),
                volume: dec!(1),
            },
            Bar::flat(ts(120), dec!(96)),
        ];
        InMemorySource::with_bars("1m".parse().unwrap(), "X", bars).unwrap()
    }

    #[test]
    fn trade_cost_override_applies() {
        let req = request().with_trade_cost(dec!(0.001));
        let result = run_blocking(&req, &source(), &CancelHandle::new()).unwrap();
        assert_eq!(result.metadata.config.trading_cost_rate, dec!(0.001));
        assert!(result.metadata.trade_cost_overridden);
        assert_eq!(result.summary().cost_paid, dec!(0.095));
    }

    #[test]
    fn invalid_trade_cost_rejected_before_fetch() {
        let req = request().with_trade_cost(dec!(1.5));
        let err = run_blocking(&req, &source(), &CancelHandle::new()).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::CostRateOutOfRange(_))));
    }

    #[test]
    fn inverted_window_rejected() {
        let mut req = request();
        req.start = ts(500);
        assert!(matches!(
            run_blocking(&req, &source(), &CancelHandle::new()),
            Err(RunError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn run_id_is_stable_and_tracks_cost() {
        let a = run_blocking(&request(), &source(), &CancelHandle::new()).unwrap();
        let b = run_blocking(&request(), &source(), &CancelHandle::new()).unwrap();
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a, b);

        let c = run_blocking(&request().with_trade_cost(dec!(0.002)), &source(), &CancelHandle::new()).unwrap();
        assert_ne!(a.run_id, c.run_id);
        assert_eq!(a.dataset_hash, c.dataset_hash);
    }

    #[test]
    fn run_id_ignores_bars_the_clock_skips() {
        let req = request();
        let loaded = |bars: Vec<Bar>| LoadedData {
            symbol: "X".into(),
            dataset_hash: gridstrike_core::data::dataset_hash("X", &bars),
            bars,
            origin: DataOrigin::Source("memory".into()),
            has_synthetic: false,
        };
        let bars = source().fetch("X", ts(0), ts(120), req.resolution).unwrap();
        let mut padded = bars.clone();
        padded.push(Bar::flat(ts(180), dec!(200)));

        let plain = run_on_data(&req, loaded(bars), &CancelHandle::new()).unwrap();
        let extra = run_on_data(&req, loaded(padded), &CancelHandle::new()).unwrap();
        assert_eq!(plain.run_id, extra.run_id);
        assert_eq!(plain.dataset_hash, extra.dataset_hash);
        assert_eq!(plain.result.bar_count(), extra.result.bar_count());
    }

    #[test]
    fn cancelled_before_start_reports_cancel() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = run_blocking(&request(), &source(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
