//! Simulation clock: forward-only bar replay and rebalance trigger evaluation.

use crate::config::RebalanceTrigger;
use crate::data::{DataError, MarketDataSource, Resolution};
use crate::domain::Bar;
use crate::engine::planner::Ladder;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One step of the clock: the bar and its position in the replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockTick {
    pub index: usize,
    pub bar: Bar,
}

/// Lazy, finite, forward-only sequence of bars inside `[start, end]`.
///
/// Consumed by iteration; a new clock is needed to replay again. Bars outside
/// the window are skipped with a warning. A non-increasing timestamp or an
/// invalid bar yields one error and then ends the sequence.
#[derive(Debug)]
pub struct SimulationClock {
    bars: std::vec::IntoIter<Bar>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    last: Option<DateTime<Utc>>,
    next_index: usize,
    skipped: usize,
    done: bool,
}

impl SimulationClock {
    pub fn new(bars: Vec<Bar>, start: DateTime<Utc>, end: DateTime<Utc>, resolution: Resolution) -> Self {
        Self {
            bars: bars.into_iter(),
            start,
            end,
            resolution,
            last: None,
            next_index: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Fetch the window from a source and wrap it in a clock.
    pub fn from_source(
        source: &dyn MarketDataSource,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Self, DataError> {
        let bars = source.fetch(symbol, start, end, resolution)?;
        Ok(Self::new(bars, start, end, resolution))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Bars dropped for falling outside the window.
    pub fn bars_skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for SimulationClock {
    type Item = Result<ClockTick, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for bar in self.bars.by_ref() {
            if bar.timestamp < self.start || bar.timestamp > self.end {
                warn!(timestamp = %bar.timestamp, "skipping bar outside the run window");
                self.skipped += 1;
                continue;
            }
            if let Some(prev) = self.last {
                if bar.timestamp <= prev {
                    self.done = true;
                    return Some(Err(DataError::NonMonotonic {
                        previous: prev,
                        current: bar.timestamp,
                    }));
                }
            }
            if let Err(e) = bar.validate() {
                self.done = true;
                return Some(Err(e.into()));
            }
            self.last = Some(bar.timestamp);
            let index = self.next_index;
            self.next_index += 1;
            return Some(Ok(ClockTick { index, bar }));
        }
        self.done = true;
        None
    }
}

/// Why a rebalance fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RebalanceReason {
    PriceDrift { drift: Decimal },
    BarInterval { bars: u32 },
    SideExhausted,
}

/// Evaluates the configured trigger after each bar.
///
/// Counts bars since the current generation was seeded; `reset` is called
/// when a new generation starts.
#[derive(Debug, Clone)]
pub struct RebalanceMonitor {
    trigger: RebalanceTrigger,
    bars_in_generation: u32,
}

impl RebalanceMonitor {
    pub fn new(trigger: RebalanceTrigger) -> Self {
        Self {
            trigger,
            bars_in_generation: 0,
        }
    }

    /// Record one processed bar and report whether the ladder should be re-seeded.
    pub fn observe(&mut self, bar: &Bar, ladder: &Ladder) -> Option<RebalanceReason> {
        self.bars_in_generation = self.bars_in_generation.saturating_add(1);
        match &self.trigger {
            RebalanceTrigger::Never => None,
            RebalanceTrigger::PriceDrift { threshold } => {
                let reference = ladder.reference();
                let drift = ((bar.close - reference) / reference).abs();
                (drift >= *threshold).then_some(RebalanceReason::PriceDrift { drift })
            }
            RebalanceTrigger::BarInterval { bars } => (self.bars_in_generation >= *bars)
                .then_some(RebalanceReason::BarInterval {
                    bars: self.bars_in_generation,
                }),
            RebalanceTrigger::SideExhausted => {
                ladder.side_exhausted().then_some(RebalanceReason::SideExhausted)
            }
        }
    }

    pub fn reset(&mut self) {
        self.bars_in_generation = 0;
    }

    pub fn bars_in_generation(&self) -> u32 {
        self.bars_in_generation
    }
}
