//! Strategy backtesters: the pluggable per-strategy half of a run.
//!
//! The engine owns the loop, the phase machine and result assembly. A
//! backtester owns strategy state and turns each bar into fills, ledger
//! updates and a snapshot. The implementation is chosen at run setup from a
//! `BacktesterKind`; grid strike is the only family today.

use crate::config::{GridConfig, ReferencePrice};
use crate::domain::{Bar, GridLevel, PositionSnapshot};
use crate::engine::clock::{ClockTick, RebalanceMonitor};
use crate::engine::ledger::{CostModel, PositionLedger};
use crate::engine::order_book::OrderBookSimulator;
use crate::engine::planner::plan;
use crate::engine::state::{ExecutedFill, RebalanceEvent};
use crate::engine::{EngineError, InvariantViolation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Output of one bar.
#[derive(Debug, Clone)]
pub struct BarStep {
    pub fills: Vec<ExecutedFill>,
    pub snapshot: PositionSnapshot,
    pub rebalance: Option<RebalanceEvent>,
}

/// Given config and a bar stream, produce fills and ledger updates.
pub trait StrategyBacktester: Send {
    fn kind(&self) -> BacktesterKind;

    /// Seed strategy state from the first bar of the run.
    fn initialize(&mut self, first_bar: &Bar) -> Result<(), EngineError>;

    /// Process one bar completely. Must not be called before `initialize`.
    fn on_bar(&mut self, tick: &ClockTick) -> Result<BarStep, EngineError>;

    /// Every level planned so far, all generations.
    fn level_history(&self) -> Vec<GridLevel>;

    /// Number of ladder generations seeded so far.
    fn generations(&self) -> u32;
}

/// Selects the backtester implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktesterKind {
    #[default]
    GridStrike,
}

impl fmt::Display for BacktesterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktesterKind::GridStrike => write!(f, "grid_strike"),
        }
    }
}

impl FromStr for BacktesterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid_strike" | "grid-strike" | "gridstrike" => Ok(BacktesterKind::GridStrike),
            other => Err(format!("unknown backtester '{other}'")),
        }
    }
}

/// Build the backtester for `kind`. Validates the config first.
pub fn build_backtester(
    kind: BacktesterKind,
    config: &GridConfig,
) -> Result<Box<dyn StrategyBacktester>, EngineError> {
    match kind {
        BacktesterKind::GridStrike => Ok(Box::new(GridStrikeBacktester::new(config.clone())?)),
    }
}

/// Grid-strike: ladder of resting limits around a reference, optional re-seeding.
pub struct GridStrikeBacktester {
    config: GridConfig,
    book: Option<OrderBookSimulator>,
    ledger: PositionLedger,
    monitor: RebalanceMonitor,
}

impl GridStrikeBacktester {
    pub fn new(config: GridConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let ledger = PositionLedger::new(
            CostModel::new(config.trading_cost_rate),
            config.initial_capital,
        );
        let monitor = RebalanceMonitor::new(config.effective_trigger().clone());
        Ok(Self {
            config,
            book: None,
            ledger,
            monitor,
        })
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn order_book(&self) -> Option<&OrderBookSimulator> {
        self.book.as_ref()
    }

    fn reference_for(&self, first_bar: &Bar) -> Decimal {
        match self.config.reference_price {
            ReferencePrice::FirstOpen => first_bar.open,
            ReferencePrice::FirstClose => first_bar.close,
            ReferencePrice::Fixed(price) => price,
        }
    }
}

impl StrategyBacktester for GridStrikeBacktester {
    fn kind(&self) -> BacktesterKind {
        BacktesterKind::GridStrike
    }

    fn initialize(&mut self, first_bar: &Bar) -> Result<(), EngineError> {
        let reference = self.reference_for(first_bar);
        let ladder = plan(reference, &self.config, 0)?;
        info!(
            symbol = %self.config.symbol,
            reference = %reference,
            levels = ladder.len(),
            "grid seeded"
        );
        self.book = Some(OrderBookSimulator::new(ladder));
        self.monitor.reset();
        Ok(())
    }

    fn on_bar(&mut self, tick: &ClockTick) -> Result<BarStep, EngineError> {
        let book = self
            .book
            .as_mut()
            .ok_or(InvariantViolation::NotInitialized(tick.index))?;
        let bar = &tick.bar;

        // ─── Fills ───
        let events = book.evaluate(bar, tick.index)?;

        // ─── Ledger ───
        let mut fills = Vec::with_capacity(events.len());
        for event in events {
            let outcome = self.ledger.apply(&event);
            fills.push(ExecutedFill {
                fill: event,
                cost: outcome.cost,
                realized_pnl: outcome.realized_pnl,
            });
        }
        self.ledger.verify_inventory()?;

        // ─── Mark ───
        let snapshot = self.ledger.mark(bar, tick.index);

        // ─── Rebalance ───
        let mut rebalance = None;
        if let Some(reason) = self.monitor.observe(bar, book.ladder()) {
            let event = book.rebalance(bar.close, &self.config, tick.index, bar.timestamp, reason)?;
            info!(
                bar = tick.index,
                old_reference = %event.old_reference,
                new_reference = %event.new_reference,
                cancelled = event.cancelled,
                generation = event.to_generation,
                "grid rebalanced"
            );
            self.monitor.reset();
            rebalance = Some(event);
        }

        Ok(BarStep {
            fills,
            snapshot,
            rebalance,
        })
    }

    fn level_history(&self) -> Vec<GridLevel> {
        self.book
            .as_ref()
            .map(|b| b.level_history())
            .unwrap_or_default()
    }

    fn generations(&self) -> u32 {
        self.book.as_ref().map_or(0, |b| b.generation() + 1)
    }
}
