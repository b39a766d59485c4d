//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Ladder shape: 2n levels, n strictly below and n strictly above, monotonic
//! 2. Inventory: net size equals filled buy size minus filled sell size
//! 3. No double fills: a level fills at most once
//! 4. Mark idempotence: marking twice without fills changes nothing
//! 5. Series round-trip: summary recomputed from the series matches

use chrono::{DateTime, Utc};
use gridstrike_core::config::{GridConfig, RebalanceTrigger, SpacingType};
use gridstrike_core::data::Resolution;
use gridstrike_core::domain::{Bar, LevelStatus, Side};
use gridstrike_core::engine::{
    plan, run_backtest, BacktesterKind, CancelHandle, CostModel, PositionLedger,
};
use gridstrike_core::report::summarize_series;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Decimal> {
    (5_000i64..50_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_abs_config() -> impl Strategy<Value = GridConfig> {
    (1i64..500, 1u32..8, 1i64..100).prop_map(|(spacing, n, size)| {
        GridConfig::new(
            "PROP",
            SpacingType::Absolute,
            Decimal::new(spacing, 2),
            n,
            Decimal::new(size, 1),
        )
    })
}

fn arb_pct_config() -> impl Strategy<Value = GridConfig> {
    (1i64..500, 1u32..8).prop_map(|(bps, n)| {
        GridConfig::new(
            "PROP",
            SpacingType::Percentage,
            Decimal::new(bps, 4),
            n,
            Decimal::ONE,
        )
    })
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Random walk of sane one-minute bars starting near 100.
fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-400i64..400, 0i64..300, 0i64..300), 1..120).prop_map(|steps| {
        let mut price = 10_000i64;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (step, up, down))| {
                let open = price;
                let close = (price + step).max(3_000);
                let high = open.max(close) + up;
                let low = (open.min(close) - down).max(1_000);
                price = close;
                Bar {
                    timestamp: ts(i as i64 * 60),
                    open: Decimal::new(open, 2),
                    high: Decimal::new(high, 2),
                    low: Decimal::new(low, 2),
                    close: Decimal::new(close, 2),
                    volume: Decimal::ONE,
                }
            })
            .collect()
    })
}

fn arb_trigger() -> impl Strategy<Value = RebalanceTrigger> {
    prop_oneof![
        Just(RebalanceTrigger::Never),
        Just(RebalanceTrigger::SideExhausted),
        (1u32..10).prop_map(|bars| RebalanceTrigger::BarInterval { bars }),
        (1i64..100).prop_map(|t| RebalanceTrigger::PriceDrift {
            threshold: Decimal::new(t, 3)
        }),
    ]
}

fn one_minute() -> Resolution {
    "1m".parse().unwrap()
}

// ── 1. Ladder shape ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn ladder_has_n_levels_per_side(config in prop_oneof![arb_abs_config(), arb_pct_config()], reference in arb_price()) {
        let ladder = plan(reference, &config, 0).unwrap();
        let n = config.levels_per_side as usize;
        prop_assert_eq!(ladder.len(), 2 * n);

        let buys: Vec<Decimal> = ladder.buys().map(|l| l.price).collect();
        let sells: Vec<Decimal> = ladder.sells().map(|l| l.price).collect();
        prop_assert_eq!(buys.len(), n);
        prop_assert_eq!(sells.len(), n);
        prop_assert!(buys.iter().all(|p| *p < reference && *p > Decimal::ZERO));
        prop_assert!(sells.iter().all(|p| *p > reference));
        prop_assert!(buys.windows(2).all(|w| w[1] < w[0]));
        prop_assert!(sells.windows(2).all(|w| w[1] > w[0]));
        prop_assert!(ladder.levels().iter().all(|l| l.status == LevelStatus::Pending));
        prop_assert!(ladder.verify().is_ok());
    }

    #[test]
    fn planning_is_deterministic(config in arb_pct_config(), reference in arb_price()) {
        let a = plan(reference, &config, 3).unwrap();
        let b = plan(reference, &config, 3).unwrap();
        prop_assert_eq!(a, b);
    }
}

// ── 2 & 3. Inventory and single fills ────────────────────────────────

proptest! {
    #[test]
    fn net_size_matches_filled_levels(
        bars in arb_bars(),
        config in arb_abs_config(),
        trigger in arb_trigger(),
    ) {
        let mut config = config;
        config.rebalanced = true;
        config.rebalance_trigger = trigger;
        let end = bars.last().unwrap().timestamp;

        let result = match run_backtest(
            &config,
            bars,
            ts(0),
            end,
            one_minute(),
            BacktesterKind::GridStrike,
            &CancelHandle::new(),
        ) {
            Ok(r) => r,
            // Re-seeding near zero can make a ladder infeasible.
            Err(gridstrike_core::EngineError::InvalidConfig(_)) => return Ok(()),
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        };

        let filled_buys = result.levels.iter()
            .filter(|l| l.side == Side::Buy && l.status == LevelStatus::Filled)
            .count();
        let filled_sells = result.levels.iter()
            .filter(|l| l.side == Side::Sell && l.status == LevelStatus::Filled)
            .count();
        let expected = Decimal::from(filled_buys as i64 - filled_sells as i64) * config.order_size;
        prop_assert_eq!(result.summary.final_net_size, expected);
        prop_assert_eq!(result.fills.len(), filled_buys + filled_sells);

        let mut seen = HashSet::new();
        for f in &result.fills {
            prop_assert!(seen.insert(f.fill.level_id), "level {} filled twice", f.fill.level_id);
        }

        for level in result.levels.iter().filter(|l| l.status == LevelStatus::Cancelled) {
            prop_assert!(!seen.contains(&level.id));
        }
    }
}

// ── 4. Mark idempotence ──────────────────────────────────────────────

proptest! {
    #[test]
    fn mark_twice_is_identical(bars in arb_bars(), rate in 0i64..50) {
        let config = GridConfig::new("PROP", SpacingType::Absolute, Decimal::ONE, 3, Decimal::ONE);
        let mut ledger = PositionLedger::new(CostModel::new(Decimal::new(rate, 4)), config.initial_capital);
        let mut book = gridstrike_core::engine::OrderBookSimulator::new(plan(bars[0].open, &config, 0).unwrap());

        for (i, bar) in bars.iter().enumerate() {
            for fill in book.evaluate(bar, i).unwrap() {
                ledger.apply(&fill);
            }
            let a = ledger.mark(bar, i);
            let b = ledger.mark(bar, i);
            prop_assert_eq!(a, b);
            prop_assert!(ledger.verify_inventory().is_ok());
        }
    }
}

// ── 5. Series round-trip ─────────────────────────────────────────────

proptest! {
    #[test]
    fn summary_reproducible_from_series(bars in arb_bars(), rate in 0i64..50) {
        let mut config = GridConfig::new("PROP", SpacingType::Absolute, Decimal::new(150, 2), 4, Decimal::ONE);
        config.trading_cost_rate = Decimal::new(rate, 4);
        let end = bars.last().unwrap().timestamp;
        let result = run_backtest(
            &config,
            bars,
            ts(0),
            end,
            one_minute(),
            BacktesterKind::GridStrike,
            &CancelHandle::new(),
        ).unwrap();

        let recomputed = summarize_series(result.initial_capital, &result.series());
        prop_assert_eq!(recomputed.total_return, result.summary.total_return);
        prop_assert_eq!(recomputed.max_drawdown, result.summary.max_drawdown);
        prop_assert_eq!(recomputed.final_equity, result.summary.final_equity);
    }
}
