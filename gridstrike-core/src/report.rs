//! Results report: read-only views over a `RunResult`.
//!
//! `summarize_series` is the single place return and drawdown are computed,
//! so a summary recomputed from an exported series matches the one the
//! engine reported.

use crate::domain::PositionSnapshot;
use crate::engine::{RunResult, RunSummary};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One point of the equity curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

impl From<&PositionSnapshot> for EquityPoint {
    fn from(snapshot: &PositionSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            equity: snapshot.equity,
        }
    }
}

/// Return and drawdown statistics derived from an equity series alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub final_equity: Decimal,
    pub total_return: Decimal,
    pub total_return_pct: f64,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
}

/// Total return and max drawdown of `series` relative to `initial_capital`.
///
/// The running peak starts at the initial capital. An empty series is flat.
pub fn summarize_series(initial_capital: Decimal, series: &[EquityPoint]) -> SeriesSummary {
    let final_equity = series.last().map_or(initial_capital, |p| p.equity);
    let total_return = final_equity - initial_capital;

    let mut peak = initial_capital;
    let mut max_drawdown = Decimal::ZERO;
    let mut max_drawdown_frac = Decimal::ZERO;
    for point in series {
        if point.equity > peak {
            peak = point.equity;
        }
        let drawdown = peak - point.equity;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
        if peak > Decimal::ZERO {
            let frac = drawdown / peak;
            if frac > max_drawdown_frac {
                max_drawdown_frac = frac;
            }
        }
    }

    SeriesSummary {
        final_equity,
        total_return,
        total_return_pct: pct(total_return, initial_capital),
        max_drawdown,
        max_drawdown_pct: (max_drawdown_frac * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0),
    }
}

fn pct(part: Decimal, whole: Decimal) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    (part / whole * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

/// Read-only report over a completed run.
pub struct ResultsReport<'a> {
    result: &'a RunResult,
}

impl<'a> ResultsReport<'a> {
    pub fn new(result: &'a RunResult) -> Self {
        Self { result }
    }

    pub fn summary(&self) -> &RunSummary {
        self.result.summary()
    }

    /// Equity curve for charting.
    pub fn series(&self) -> Vec<EquityPoint> {
        self.result.series()
    }

    /// Multi-line textual report.
    pub fn render(&self) -> String {
        let r = self.result;
        let s = &r.summary;
        let mut out = String::new();

        let _ = writeln!(out, "=== Grid Strike Backtest ===");
        let _ = writeln!(out, "Symbol:         {}", r.symbol);
        let _ = writeln!(out, "Period:         {} to {} ({})", r.start, r.end, r.resolution);
        let _ = writeln!(out, "Backtester:     {}", r.backtester);
        let _ = writeln!(out, "Bars:           {}", s.bar_count);
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Performance ---");
        let _ = writeln!(out, "Initial:        {}", s.initial_capital);
        let _ = writeln!(out, "Final Equity:   {}", s.final_equity.round_dp(4));
        let _ = writeln!(
            out,
            "Total Return:   {} ({:.2}%)",
            s.total_return.round_dp(4),
            s.total_return_pct
        );
        let _ = writeln!(
            out,
            "Max Drawdown:   {} ({:.2}%)",
            s.max_drawdown.round_dp(4),
            s.max_drawdown_pct
        );
        let _ = writeln!(out, "Realized PnL:   {}", s.realized_pnl.round_dp(4));
        let _ = writeln!(out, "Unrealized PnL: {}", s.unrealized_pnl.round_dp(4));
        let _ = writeln!(out, "Cost Paid:      {}", s.cost_paid.round_dp(4));
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Activity ---");
        let _ = writeln!(
            out,
            "Fills:          {} ({} buy / {} sell)",
            s.fill_count, s.buy_fills, s.sell_fills
        );
        let _ = writeln!(out, "Net Size:       {}", s.final_net_size);
        let _ = writeln!(out, "Generations:    {}", s.generations);
        let _ = write!(out, "Rebalances:     {}", s.rebalances);
        out
    }
}
