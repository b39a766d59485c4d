//! Backtesting engine: grid planning, bar replay and supporting infrastructure.
//!
//! The engine consumes an ordered bar stream from a `SimulationClock` and runs
//! one pass per bar:
//!
//! 1. Fills: the order book checks pending levels against the bar's range
//! 2. Ledger: each fill updates size, basis, realized PnL and cost paid
//! 3. Mark: unrealized PnL and equity at the bar close
//! 4. Rebalance: if the trigger fires, cancel pending levels and re-seed

pub mod backtester;
pub mod clock;
pub mod ledger;
pub mod loop_runner;
pub mod order_book;
pub mod planner;
pub mod state;

pub use backtester::{build_backtester, BacktesterKind, BarStep, GridStrikeBacktester, StrategyBacktester};
pub use clock::{ClockTick, RebalanceMonitor, RebalanceReason, SimulationClock};
pub use ledger::{CostModel, FillOutcome, PositionLedger};
pub use loop_runner::{run_backtest, run_from_source, BacktestEngine};
pub use order_book::{OrderBookError, OrderBookSimulator};
pub use planner::{plan, Ladder};
pub use state::{EnginePhase, ExecutedFill, RebalanceEvent, RunResult, RunSummary};

use crate::config::ConfigError;
use crate::data::DataError;
use crate::domain::{LevelId, LevelStatus};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A broken internal guarantee. Always a logic defect, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("ladder ordering broken: {0}")]
    LadderOrdering(String),

    #[error("level {level} is already {status}")]
    LevelNotPending { level: LevelId, status: LevelStatus },

    #[error("net size {net_size} does not match filled buys {bought} minus filled sells {sold}")]
    InventoryMismatch {
        net_size: Decimal,
        bought: Decimal,
        sold: Decimal,
    },

    #[error("bar {0} processed before the strategy was initialized")]
    NotInitialized(usize),
}

/// Errors that stop a run. Any of them moves the engine to `Failed`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("no market data for {symbol} in the requested window")]
    DataUnavailable { symbol: String },

    #[error(transparent)]
    Data(DataError),

    #[error("simulation invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("run cancelled after {bars_processed} bars")]
    Cancelled { bars_processed: usize },

    #[error("engine is {0}, expected idle")]
    InvalidState(EnginePhase),
}

impl From<DataError> for EngineError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::DataUnavailable { symbol, .. } => EngineError::DataUnavailable { symbol },
            other => EngineError::Data(other),
        }
    }
}

impl From<OrderBookError> for EngineError {
    fn from(err: OrderBookError) -> Self {
        match err {
            OrderBookError::Invariant(v) => EngineError::Invariant(v),
            OrderBookError::Replan(c) => EngineError::InvalidConfig(c),
        }
    }
}

/// Shared cancellation flag. The engine polls it between bars only.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
