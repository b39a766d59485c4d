//! Grid level planner: builds the ladder around a reference price.
//!
//! Pure: the same reference, config and generation always yield the same
//! ladder, level IDs included. Rounding to `tick_size` is applied in the
//! direction that keeps each level on its own side of the reference (buys
//! round down, sells round up).

use crate::config::{ConfigError, GridConfig, SpacingType};
use crate::domain::{GridLevel, LevelId, LevelStatus, Side};
use crate::engine::InvariantViolation;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for compounded percentage levels before tick rounding.
const PERCENT_LEVEL_DP: u32 = 12;

/// One generation of grid levels, sorted by ascending price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    generation: u32,
    reference: Decimal,
    levels: Vec<GridLevel>,
}

impl Ladder {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn reference(&self) -> Decimal {
        self.reference
    }

    /// All levels, lowest price first.
    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Buy levels, closest to the reference first.
    pub fn buys(&self) -> impl Iterator<Item = &GridLevel> {
        self.levels.iter().rev().filter(|l| l.side == Side::Buy)
    }

    /// Sell levels, closest to the reference first.
    pub fn sells(&self) -> impl Iterator<Item = &GridLevel> {
        self.levels.iter().filter(|l| l.side == Side::Sell)
    }

    pub fn pending_count(&self) -> usize {
        self.levels.iter().filter(|l| l.is_pending()).count()
    }

    /// True once every level on at least one side has filled.
    pub fn side_exhausted(&self) -> bool {
        let all_filled = |side: Side| {
            self.levels
                .iter()
                .filter(|l| l.side == side)
                .all(|l| l.status == LevelStatus::Filled)
        };
        all_filled(Side::Buy) || all_filled(Side::Sell)
    }

    pub(crate) fn level_mut(&mut self, index: usize) -> Option<&mut GridLevel> {
        self.levels.get_mut(index)
    }

    /// Mark every pending level cancelled and return how many there were.
    pub(crate) fn cancel_pending(&mut self) -> usize {
        let mut cancelled = 0;
        for level in self.levels.iter_mut().filter(|l| l.is_pending()) {
            level.status = LevelStatus::Cancelled;
            cancelled += 1;
        }
        cancelled
    }

    pub(crate) fn into_levels(self) -> Vec<GridLevel> {
        self.levels
    }

    /// Check the ordering invariant: prices strictly increase, buys sit
    /// strictly below the reference and sells strictly above.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        for pair in self.levels.windows(2) {
            if pair[1].price <= pair[0].price {
                return Err(InvariantViolation::LadderOrdering(format!(
                    "{} at {} not above {} at {}",
                    pair[1].id, pair[1].price, pair[0].id, pair[0].price
                )));
            }
        }
        for level in &self.levels {
            let on_side = match level.side {
                Side::Buy => level.price < self.reference,
                Side::Sell => level.price > self.reference,
            };
            if !on_side {
                return Err(InvariantViolation::LadderOrdering(format!(
                    "{} level {} at {} on wrong side of reference {}",
                    level.side, level.id, level.price, self.reference
                )));
            }
        }
        Ok(())
    }
}

/// Plan `levels_per_side` buys below and as many sells above `reference`.
///
/// Fails with `InvalidConfig` when the config itself is invalid, when the
/// reference is not positive, when the lowest buy would be at or below zero,
/// when a level price overflows `Decimal`, or when tick rounding collapses
/// levels.
pub fn plan(reference: Decimal, config: &GridConfig, generation: u32) -> Result<Ladder, ConfigError> {
    config.validate()?;
    if reference <= Decimal::ZERO {
        return Err(ConfigError::InfeasibleLadder(format!(
            "reference price {reference} is not positive"
        )));
    }

    let n = config.levels_per_side;
    let mut buys = Vec::with_capacity(n as usize);
    let mut sells = Vec::with_capacity(n as usize);

    let overflow =
        || ConfigError::InfeasibleLadder(format!("level prices overflow around reference {reference}"));

    match config.spacing_type {
        SpacingType::Absolute => {
            for i in 1..=n {
                let offset = config
                    .spacing_value
                    .checked_mul(Decimal::from(i))
                    .ok_or_else(overflow)?;
                buys.push(reference.checked_sub(offset).ok_or_else(overflow)?);
                sells.push(reference.checked_add(offset).ok_or_else(overflow)?);
            }
        }
        SpacingType::Percentage => {
            let down = Decimal::ONE - config.spacing_value;
            let up = Decimal::ONE + config.spacing_value;
            let (mut buy, mut sell) = (reference, reference);
            for _ in 1..=n {
                buy = buy.checked_mul(down).ok_or_else(overflow)?.round_dp(PERCENT_LEVEL_DP);
                sell = sell.checked_mul(up).ok_or_else(overflow)?.round_dp(PERCENT_LEVEL_DP);
                buys.push(buy);
                sells.push(sell);
            }
        }
    }

    if let Some(tick) = config.tick_size {
        for price in buys.iter_mut() {
            *price = round_to_tick(*price, tick, Side::Buy).ok_or_else(overflow)?;
        }
        for price in sells.iter_mut() {
            *price = round_to_tick(*price, tick, Side::Sell).ok_or_else(overflow)?;
        }
    }

    // buys[n-1] is the lowest level
    if let Some(lowest) = buys.last() {
        if *lowest <= Decimal::ZERO {
            return Err(ConfigError::InfeasibleLadder(format!(
                "lowest buy level {lowest} is not positive (reference {reference})"
            )));
        }
    }

    let mut levels = Vec::with_capacity(2 * n as usize);
    for (rung, price) in buys.iter().enumerate().rev() {
        levels.push((*price, Side::Buy, rung as u32 + 1));
    }
    for (rung, price) in sells.iter().enumerate() {
        levels.push((*price, Side::Sell, rung as u32 + 1));
    }

    let ladder = Ladder {
        generation,
        reference,
        levels: levels
            .into_iter()
            .enumerate()
            .map(|(index, (price, side, rung))| {
                GridLevel::pending(
                    LevelId::new(generation, index as u32),
                    price,
                    side,
                    config.order_size,
                    rung,
                )
            })
            .collect(),
    };

    ladder
        .verify()
        .map_err(|v| ConfigError::InfeasibleLadder(format!("{v} (tick rounding collapses levels)")))?;

    Ok(ladder)
}

/// Round a price onto the tick grid: buys down, sells up. `None` on overflow.
pub fn round_to_tick(price: Decimal, tick: Decimal, side: Side) -> Option<Decimal> {
    let ticks = price.checked_div(tick)?;
    let whole = match side {
        Side::Buy => ticks.round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity),
        Side::Sell => ticks.round_dp_with_strategy(0, RoundingStrategy::ToPositiveInfinity),
    };
    whole.checked_mul(tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn abs_config(spacing: Decimal, n: u32) -> GridConfig {
        GridConfig::new("X", SpacingType::Absolute, spacing, n, dec!(1))
    }

    fn prices(ladder: &Ladder) -> Vec<Decimal> {
        ladder.levels().iter().map(|l| l.price).collect()
    }

    #[test]
    fn absolute_ladder_around_100() {
        let ladder = plan(dec!(100), &abs_config(dec!(5), 2), 0).unwrap();
        assert_eq!(prices(&ladder), vec![dec!(90), dec!(95), dec!(105), dec!(110)]);
        let buys: Vec<_> = ladder.buys().map(|l| l.price).collect();
        let sells: Vec<_> = ladder.sells().map(|l| l.price).collect();
        assert_eq!(buys, vec![dec!(95), dec!(90)]);
        assert_eq!(sells, vec![dec!(105), dec!(110)]);
        assert!(ladder.levels().iter().all(|l| l.is_pending() && l.size == dec!(1)));
    }

    #[test]
    fn rungs_count_outward() {
        let ladder = plan(dec!(100), &abs_config(dec!(5), 2), 0).unwrap();
        let rungs: Vec<u32> = ladder.levels().iter().map(|l| l.rung).collect();
        assert_eq!(rungs, vec![2, 1, 1, 2]);
    }

    #[test]
    fn percentage_ladder_compounds() {
        let config = GridConfig::new("X", SpacingType::Percentage, dec!(0.1), 2, dec!(1));
        let ladder = plan(dec!(100), &config, 0).unwrap();
        assert_eq!(prices(&ladder), vec![dec!(81), dec!(90), dec!(110), dec!(121)]);
    }

    #[test]
    fn deterministic_ids() {
        let a = plan(dec!(100), &abs_config(dec!(5), 3), 4).unwrap();
        let b = plan(dec!(100), &abs_config(dec!(5), 3), 4).unwrap();
        assert_eq!(a, b);
        assert!(a.levels().iter().all(|l| l.generation() == 4));
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(matches!(
            plan(dec!(100), &abs_config(dec!(0), 2), 0),
            Err(ConfigError::NonPositiveSpacing(_))
        ));
        assert!(matches!(
            plan(dec!(100), &abs_config(dec!(5), 0), 0),
            Err(ConfigError::ZeroLevels)
        ));
    }

    #[test]
    fn rejects_ladder_below_zero() {
        let err = plan(dec!(10), &abs_config(dec!(5), 2), 0).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleLadder(_)));
    }

    #[test]
    fn tick_rounding_is_directional() {
        let mut config = GridConfig::new("X", SpacingType::Percentage, dec!(0.013), 1, dec!(1));
        config.tick_size = Some(dec!(0.5));
        let ladder = plan(dec!(100), &config, 0).unwrap();
        // 98.7 → 98.5, 101.3 → 101.5
        assert_eq!(prices(&ladder), vec![dec!(98.5), dec!(101.5)]);
    }

    #[test]
    fn tick_rounding_collapse_rejected() {
        let mut config = abs_config(dec!(0.1), 3);
        config.tick_size = Some(dec!(1));
        let err = plan(dec!(100), &config, 0).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleLadder(_)));
    }

    #[test]
    fn compounding_overflow_is_infeasible() {
        let config = GridConfig::new("X", SpacingType::Percentage, dec!(0.5), 200, dec!(1));
        assert!(config.validate().is_ok());
        let err = plan(dec!(100), &config, 0).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleLadder(_)), "{err}");
    }

    #[test]
    fn absolute_offset_overflow_is_infeasible() {
        let config = abs_config(Decimal::MAX / dec!(2), 3);
        assert!(config.validate().is_ok());
        let err = plan(dec!(100), &config, 0).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleLadder(_)), "{err}");
    }

    #[test]
    fn tick_rounding_overflow_is_infeasible() {
        let mut config = abs_config(dec!(1), 1);
        config.tick_size = Some(dec!(0.0000000001));
        let err = plan(Decimal::MAX / dec!(2), &config, 0).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleLadder(_)), "{err}");
    }

    #[test]
    fn oversized_ladder_rejected_before_allocation() {
        let err = plan(dec!(100), &abs_config(dec!(1), u32::MAX), 0).unwrap_err();
        assert_eq!(err, ConfigError::TooManyLevels(u32::MAX));
    }

    #[test]
    fn side_exhausted_tracks_fills() {
        let mut ladder = plan(dec!(100), &abs_config(dec!(5), 2), 0).unwrap();
        assert!(!ladder.side_exhausted());
        ladder.level_mut(2).unwrap().status = LevelStatus::Filled;
        assert!(!ladder.side_exhausted());
        ladder.level_mut(3).unwrap().status = LevelStatus::Filled;
        assert!(ladder.side_exhausted());
    }

    #[test]
    fn cancel_pending_skips_filled() {
        let mut ladder = plan(dec!(100), &abs_config(dec!(5), 2), 0).unwrap();
        ladder.level_mut(1).unwrap().status = LevelStatus::Filled;
        assert_eq!(ladder.cancel_pending(), 3);
        assert_eq!(ladder.pending_count(), 0);
        assert_eq!(ladder.levels()[1].status, LevelStatus::Filled);
    }
}
