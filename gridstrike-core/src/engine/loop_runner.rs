//! Bar-by-bar replay loop: drives a strategy backtester through a clock.
//!
//! Per bar, in order:
//! 1. Cancellation check (only ever between bars)
//! 2. Backtester step: fills → ledger → mark → rebalance
//! 3. Snapshot, fills and rebalance appended to the run history
//!
//! A run either completes with a full `RunResult` or fails; a truncated result
//! is never returned.

use crate::config::GridConfig;
use crate::data::{MarketDataSource, Resolution};
use crate::domain::Bar;
use crate::engine::backtester::{build_backtester, BacktesterKind, StrategyBacktester};
use crate::engine::clock::SimulationClock;
use crate::engine::state::{EnginePhase, RunResult};
use crate::engine::{CancelHandle, EngineError};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Orchestrates one run. Single use: `Idle → Running → Completed | Failed`.
pub struct BacktestEngine {
    config: GridConfig,
    phase: EnginePhase,
}

impl BacktestEngine {
    /// Validate the config and enter `Idle`. Nothing is built for an invalid config.
    pub fn new(config: GridConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            phase: EnginePhase::Idle,
        })
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Replay every bar of `clock` through `backtester`.
    pub fn run(
        &mut self,
        clock: SimulationClock,
        backtester: &mut dyn StrategyBacktester,
        cancel: &CancelHandle,
    ) -> Result<RunResult, EngineError> {
        if self.phase != EnginePhase::Idle {
            return Err(EngineError::InvalidState(self.phase));
        }
        self.phase = EnginePhase::Running;

        match self.replay(clock, backtester, cancel) {
            Ok(result) => {
                self.phase = EnginePhase::Completed;
                info!(
                    symbol = %result.symbol,
                    bars = result.bar_count(),
                    fills = result.summary.fill_count,
                    final_equity = %result.summary.final_equity,
                    "run completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.phase = EnginePhase::Failed;
                warn!(error = %e, "run failed");
                Err(e)
            }
        }
    }

    /// Fetch the window from `source` and replay it. A fetch failure
    /// (including an empty window) moves the engine to `Failed`.
    pub fn run_source(
        &mut self,
        source: &dyn MarketDataSource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
        backtester: &mut dyn StrategyBacktester,
        cancel: &CancelHandle,
    ) -> Result<RunResult, EngineError> {
        if self.phase != EnginePhase::Idle {
            return Err(EngineError::InvalidState(self.phase));
        }
        match SimulationClock::from_source(source, &self.config.symbol, start, end, resolution) {
            Ok(clock) => self.run(clock, backtester, cancel),
            Err(e) => {
                self.phase = EnginePhase::Failed;
                warn!(source = source.name(), error = %e, "market data fetch failed");
                Err(e.into())
            }
        }
    }

    fn replay(
        &self,
        clock: SimulationClock,
        backtester: &mut dyn StrategyBacktester,
        cancel: &CancelHandle,
    ) -> Result<RunResult, EngineError> {
        let (start, end, resolution) = (clock.start(), clock.end(), clock.resolution());
        info!(
            symbol = %self.config.symbol,
            %start,
            %end,
            %resolution,
            backtester = %backtester.kind(),
            "run started"
        );

        let mut snapshots = Vec::new();
        let mut fills = Vec::new();
        let mut rebalances = Vec::new();

        for tick in clock {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled {
                    bars_processed: snapshots.len(),
                });
            }
            let tick = tick?;
            if tick.index == 0 {
                backtester.initialize(&tick.bar)?;
            }

            let step = backtester.on_bar(&tick)?;
            fills.extend(step.fills);
            rebalances.extend(step.rebalance);
            snapshots.push(step.snapshot);
        }

        if snapshots.is_empty() {
            return Err(EngineError::DataUnavailable {
                symbol: self.config.symbol.clone(),
            });
        }

        Ok(RunResult::build(
            self.config.symbol.clone(),
            resolution,
            start,
            end,
            backtester.kind(),
            self.config.initial_capital,
            snapshots,
            fills,
            backtester.level_history(),
            rebalances,
            backtester.generations(),
        ))
    }
}

/// One-call run over in-memory bars: build engine, clock and backtester, replay.
pub fn run_backtest(
    config: &GridConfig,
    bars: Vec<Bar>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    kind: BacktesterKind,
    cancel: &CancelHandle,
) -> Result<RunResult, EngineError> {
    let mut engine = BacktestEngine::new(config.clone())?;
    let mut backtester = build_backtester(kind, config)?;
    let clock = SimulationClock::new(bars, start, end, resolution);
    engine.run(clock, backtester.as_mut(), cancel)
}

/// Fetch the window from `source`, then run.
pub fn run_from_source(
    config: &GridConfig,
    source: &dyn MarketDataSource,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    kind: BacktesterKind,
    cancel: &CancelHandle,
) -> Result<RunResult, EngineError> {
    let mut engine = BacktestEngine::new(config.clone())?;
    let mut backtester = build_backtester(kind, config)?;
    engine.run_source(source, start, end, resolution, backtester.as_mut(), cancel)
}
