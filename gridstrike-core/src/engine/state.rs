//! Engine lifecycle and run result types.

use crate::data::Resolution;
use crate::domain::{FillEvent, GridLevel, PositionSnapshot, Side};
use crate::engine::backtester::BacktesterKind;
use crate::engine::clock::RebalanceReason;
use crate::report::{summarize_series, EquityPoint};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `Idle → Running → Completed` or `Failed`. Terminal phases never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::Running => "running",
            EnginePhase::Completed => "completed",
            EnginePhase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A fill together with what it did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedFill {
    pub fill: FillEvent,
    /// Trading cost charged on this fill.
    pub cost: Decimal,
    /// Realized PnL booked by this fill, net of its closing cost.
    pub realized_pnl: Decimal,
}

/// A ladder re-seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub old_reference: Decimal,
    pub new_reference: Decimal,
    pub from_generation: u32,
    pub to_generation: u32,
    /// Pending levels cancelled (never filled) by the re-seed.
    pub cancelled: usize,
    pub reason: RebalanceReason,
}

/// Terminal statistics of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    /// Final equity minus initial capital.
    pub total_return: Decimal,
    pub total_return_pct: f64,
    /// Largest peak-to-trough equity decline, in currency.
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub cost_paid: Decimal,
    pub final_net_size: Decimal,
    pub fill_count: usize,
    pub buy_fills: usize,
    pub sell_fills: usize,
    pub generations: u32,
    pub rebalances: usize,
    pub bar_count: usize,
}

/// Complete output of a successful run. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub symbol: String,
    pub resolution: Resolution,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub backtester: BacktesterKind,
    pub initial_capital: Decimal,
    /// One snapshot per processed bar, in bar order.
    pub snapshots: Vec<PositionSnapshot>,
    pub fills: Vec<ExecutedFill>,
    /// Every level planned during the run, all generations.
    pub levels: Vec<GridLevel>,
    pub rebalances: Vec<RebalanceEvent>,
    pub summary: RunSummary,
}

impl RunResult {
    /// Assemble the result and compute its summary from the snapshots.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        symbol: String,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        backtester: BacktesterKind,
        initial_capital: Decimal,
        snapshots: Vec<PositionSnapshot>,
        fills: Vec<ExecutedFill>,
        levels: Vec<GridLevel>,
        rebalances: Vec<RebalanceEvent>,
        generations: u32,
    ) -> Self {
        let series: Vec<EquityPoint> = snapshots.iter().map(EquityPoint::from).collect();
        let stats = summarize_series(initial_capital, &series);
        let last = snapshots.last();
        let buy_fills = fills.iter().filter(|f| f.fill.side == Side::Buy).count();

        let summary = RunSummary {
            initial_capital,
            final_equity: stats.final_equity,
            total_return: stats.total_return,
            total_return_pct: stats.total_return_pct,
            max_drawdown: stats.max_drawdown,
            max_drawdown_pct: stats.max_drawdown_pct,
            realized_pnl: last.map_or(Decimal::ZERO, |s| s.realized_pnl),
            unrealized_pnl: last.map_or(Decimal::ZERO, |s| s.unrealized_pnl),
            cost_paid: last.map_or(Decimal::ZERO, |s| s.cost_paid),
            final_net_size: last.map_or(Decimal::ZERO, |s| s.net_size),
            fill_count: fills.len(),
            buy_fills,
            sell_fills: fills.len() - buy_fills,
            generations,
            rebalances: rebalances.len(),
            bar_count: snapshots.len(),
        };

        Self {
            symbol,
            resolution,
            start,
            end,
            backtester,
            initial_capital,
            snapshots,
            fills,
            levels,
            rebalances,
            summary,
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// `(timestamp, equity)` per bar, for charting.
    pub fn series(&self) -> Vec<EquityPoint> {
        self.snapshots.iter().map(EquityPoint::from).collect()
    }

    pub fn bar_count(&self) -> usize {
        self.snapshots.len()
    }
}
