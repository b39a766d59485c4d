//! Order book simulator: level state machine and limit-fill evaluation.
//!
//! The book owns the current ladder generation. It:
//! - Fills pending levels whose price lies inside a bar's `[low, high]`
//! - Emits one `FillEvent` per filled level, priced at the level
//! - Cancels pending levels and installs a fresh ladder on rebalance
//! - Keeps every retired level (filled or cancelled) as history
//!
//! The book does NOT touch the ledger. The backtester feeds the fills it
//! returns into the `PositionLedger`.

use crate::config::{ConfigError, GridConfig};
use crate::domain::{Bar, FillEvent, FillIdGen, GridLevel, LevelStatus, Side};
use crate::engine::clock::RebalanceReason;
use crate::engine::planner::{plan, Ladder};
use crate::engine::state::RebalanceEvent;
use crate::engine::InvariantViolation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

/// Errors from order book operations.
#[derive(Debug, Error)]
pub enum OrderBookError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("cannot re-seed ladder: {0}")]
    Replan(#[from] ConfigError),
}

pub struct OrderBookSimulator {
    ladder: Ladder,
    /// Levels from retired generations, in retirement order.
    history: Vec<GridLevel>,
    fill_ids: FillIdGen,
}

impl OrderBookSimulator {
    pub fn new(ladder: Ladder) -> Self {
        Self {
            ladder,
            history: Vec::new(),
            fill_ids: FillIdGen::default(),
        }
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    pub fn generation(&self) -> u32 {
        self.ladder.generation()
    }

    pub fn reference(&self) -> Decimal {
        self.ladder.reference()
    }

    /// Fill every pending level the bar's range touches.
    ///
    /// Fill order is closest-to-reference first. Levels at equal distance
    /// follow the bar's assumed path: an up bar (close ≥ open) visits its low
    /// first, so buys fill before sells; a down bar fills sells first.
    pub fn evaluate(&mut self, bar: &Bar, bar_index: usize) -> Result<Vec<FillEvent>, InvariantViolation> {
        let reference = self.ladder.reference();
        let first_side = if bar.is_up() { Side::Buy } else { Side::Sell };

        let mut hits: Vec<(usize, Decimal, bool)> = self
            .ladder
            .levels()
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_pending() && bar.spans(l.price))
            .map(|(i, l)| (i, (l.price - reference).abs(), l.side != first_side))
            .collect();
        hits.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let mut fills = Vec::with_capacity(hits.len());
        for (index, _, _) in hits {
            let Some(level) = self.ladder.level_mut(index) else {
                return Err(InvariantViolation::LadderOrdering(format!(
                    "level index {index} vanished during evaluation"
                )));
            };
            if level.status != LevelStatus::Pending {
                return Err(InvariantViolation::LevelNotPending {
                    level: level.id,
                    status: level.status,
                });
            }
            level.status = LevelStatus::Filled;

            let fill = FillEvent {
                id: self.fill_ids.next_id(),
                level_id: level.id,
                side: level.side,
                price: level.price,
                size: level.size,
                bar_index,
                timestamp: bar.timestamp,
            };
            debug!(
                fill = %fill.id,
                level = %fill.level_id,
                side = %fill.side,
                price = %fill.price,
                bar = bar_index,
                "level filled"
            );
            fills.push(fill);
        }

        Ok(fills)
    }

    /// Retire the current generation and seed a new ladder at `new_reference`.
    ///
    /// The new ladder is planned before anything is cancelled, so a failed
    /// plan leaves the book untouched.
    pub fn rebalance(
        &mut self,
        new_reference: Decimal,
        config: &GridConfig,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        reason: RebalanceReason,
    ) -> Result<RebalanceEvent, OrderBookError> {
        let from_generation = self.ladder.generation();
        let next = plan(new_reference, config, from_generation + 1)?;

        let old_reference = self.ladder.reference();
        let mut retired = std::mem::replace(&mut self.ladder, next);
        let cancelled = retired.cancel_pending();
        self.history.extend(retired.into_levels());

        Ok(RebalanceEvent {
            bar_index,
            timestamp,
            old_reference,
            new_reference,
            from_generation,
            to_generation: from_generation + 1,
            cancelled,
            reason,
        })
    }

    /// Every level ever planned: retired generations first, then the current one.
    pub fn level_history(&self) -> Vec<GridLevel> {
        let mut all = self.history.clone();
        all.extend(self.ladder.levels().iter().cloned());
        all
    }

    /// Total size of filled levels per side, across all generations.
    pub fn filled_size(&self, side: Side) -> Decimal {
        self.history
            .iter()
            .chain(self.ladder.levels())
            .filter(|l| l.side == side && l.status == LevelStatus::Filled)
            .map(|l| l.size)
            .sum()
    }
}
