//! Integration tests for the grid engine through the public API.
//!
//! Tests:
//! 1. The reference-100 scenario: ladder, single fills, net flat, realized PnL
//! 2. Rebalance after the sell fill cancels buy@90 and re-seeds at 105
//! 3. Zero bars in the window is DataUnavailable, never an empty success
//! 4. Resampled trade tapes drive a run end to end
//! 5. The textual report carries the headline numbers

use chrono::{DateTime, Utc};
use gridstrike_core::config::{GridConfig, RebalanceTrigger, SpacingType};
use gridstrike_core::data::{resample_trades, InMemorySource, Resolution, TradeTick};
use gridstrike_core::domain::{Bar, LevelStatus, Side};
use gridstrike_core::engine::{
    plan, run_backtest, run_from_source, BacktesterKind, CancelHandle, EngineError,
};
use gridstrike_core::fingerprint::RunFingerprint;
use gridstrike_core::report::ResultsReport;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn res(label: &str) -> Resolution {
    label.parse().unwrap()
}

fn bar(secs: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
    Bar {
        timestamp: ts(secs),
        open,
        high,
        low,
        close,
        volume: dec!(1),
    }
}

fn scenario_config() -> GridConfig {
    let mut config = GridConfig::new("BTC-USDT", SpacingType::Absolute, dec!(5), 2, dec!(2));
    config.trading_cost_rate = dec!(0.0005);
    config
}

/// Flat at 100, then a dip through 95 only, then a rally through 105 only.
fn scenario_bars() -> Vec<Bar> {
    vec![
        Bar::flat(ts(0), dec!(100)),
        bar(180, dec!(96), dec!(96), dec!(94), dec!(95.5)),
        bar(360, dec!(104), dec!(107), dec!(104), dec!(105)),
    ]
}

fn scenario_source() -> InMemorySource {
    InMemorySource::with_bars(res("3m"), "BTC-USDT", scenario_bars()).unwrap()
}

// ──────────────────────────────────────────────
// Scenarios
// ──────────────────────────────────────────────

#[test]
fn ladder_around_reference_100() {
    let ladder = plan(dec!(100), &scenario_config(), 0).unwrap();
    let buys: Vec<_> = ladder.buys().map(|l| l.price).collect();
    let sells: Vec<_> = ladder.sells().map(|l| l.price).collect();
    assert_eq!(buys, vec![dec!(95), dec!(90)]);
    assert_eq!(sells, vec![dec!(105), dec!(110)]);
}

#[test]
fn dip_then_rally_round_trip() {
    let result = run_from_source(
        &scenario_config(),
        &scenario_source(),
        ts(0),
        ts(360),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap();

    assert_eq!(result.fills.len(), 2);
    let buy = &result.fills[0];
    let sell = &result.fills[1];
    assert_eq!((buy.fill.side, buy.fill.price, buy.fill.bar_index), (Side::Buy, dec!(95), 1));
    assert_eq!((sell.fill.side, sell.fill.price, sell.fill.bar_index), (Side::Sell, dec!(105), 2));

    // buy@90 and sell@110 untouched
    let untouched: Vec<_> = result
        .levels
        .iter()
        .filter(|l| l.status == LevelStatus::Pending)
        .map(|l| l.price)
        .collect();
    assert_eq!(untouched, vec![dec!(90), dec!(110)]);

    // (105 − 95) × 2 minus 95×2×0.0005 and 105×2×0.0005
    let s = result.summary();
    assert_eq!(s.final_net_size, Decimal::ZERO);
    assert_eq!(s.realized_pnl, dec!(20) - dec!(0.095) - dec!(0.105));
    assert_eq!(s.cost_paid, dec!(0.2));
    assert_eq!(s.unrealized_pnl, Decimal::ZERO);
    assert_eq!(s.final_equity, dec!(10000) + dec!(19.8));
    assert_eq!(s.buy_fills, 1);
    assert_eq!(s.sell_fills, 1);
    assert_eq!(s.bar_count, 3);
}

#[test]
fn rebalance_after_sell_cancels_buy_90() {
    let mut config = scenario_config();
    config.rebalanced = true;
    config.rebalance_trigger = RebalanceTrigger::PriceDrift {
        threshold: dec!(0.05),
    };
    let result = run_backtest(
        &config,
        scenario_bars(),
        ts(0),
        ts(360),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap();

    assert_eq!(result.rebalances.len(), 1);
    let event = &result.rebalances[0];
    assert_eq!(event.old_reference, dec!(100));
    assert_eq!(event.new_reference, dec!(105));
    assert_eq!(event.bar_index, 2);

    let gen0_buy_90 = result
        .levels
        .iter()
        .find(|l| l.generation() == 0 && l.price == dec!(90))
        .unwrap();
    assert_eq!(gen0_buy_90.status, LevelStatus::Cancelled);

    let gen1: Vec<_> = result
        .levels
        .iter()
        .filter(|l| l.generation() == 1)
        .map(|l| (l.side, l.price, l.status))
        .collect();
    assert_eq!(
        gen1,
        vec![
            (Side::Buy, dec!(95), LevelStatus::Pending),
            (Side::Buy, dec!(100), LevelStatus::Pending),
            (Side::Sell, dec!(110), LevelStatus::Pending),
            (Side::Sell, dec!(115), LevelStatus::Pending),
        ]
    );
}

#[test]
fn bar_interval_rebalances_every_n_bars() {
    let mut config = scenario_config();
    config.rebalanced = true;
    config.rebalance_trigger = RebalanceTrigger::BarInterval { bars: 1 };
    let result = run_backtest(
        &config,
        scenario_bars(),
        ts(0),
        ts(360),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap();
    assert_eq!(result.rebalances.len(), 3);
    assert_eq!(result.summary.generations, 4);
}

#[test]
fn rebalance_flag_off_ignores_trigger() {
    let mut config = scenario_config();
    config.rebalance_trigger = RebalanceTrigger::BarInterval { bars: 1 };
    let result = run_backtest(
        &config,
        scenario_bars(),
        ts(0),
        ts(360),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap();
    assert!(result.rebalances.is_empty());
    assert_eq!(result.summary.generations, 1);
}

#[test]
fn empty_window_is_data_unavailable() {
    let err = run_from_source(
        &scenario_config(),
        &scenario_source(),
        ts(100_000),
        ts(200_000),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::DataUnavailable { .. }));
}

#[test]
fn resampled_trades_drive_a_run() {
    let prices = [dec!(100), dec!(97), dec!(94.5), dec!(99), dec!(105.5), dec!(103)];
    let trades: Vec<TradeTick> = prices
        .iter()
        .enumerate()
        .map(|(i, p)| TradeTick {
            timestamp: ts(i as i64 * 90),
            price: *p,
            size: dec!(0.1),
        })
        .collect();
    let bars = resample_trades(&trades, res("3m")).unwrap();
    assert_eq!(bars.len(), 3);

    let source = InMemorySource::with_bars(res("3m"), "BTC-USDT", bars).unwrap();
    let result = run_from_source(
        &scenario_config(),
        &source,
        ts(0),
        ts(600),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap();
    let fill_prices: Vec<_> = result.fills.iter().map(|f| f.fill.price).collect();
    assert_eq!(fill_prices, vec![dec!(95), dec!(105)]);
}

#[test]
fn report_renders_headline_numbers() {
    let result = run_backtest(
        &scenario_config(),
        scenario_bars(),
        ts(0),
        ts(360),
        res("3m"),
        BacktesterKind::GridStrike,
        &CancelHandle::new(),
    )
    .unwrap();
    let report = ResultsReport::new(&result);
    let text = report.render();
    assert!(text.contains("BTC-USDT"));
    assert!(text.contains("Fills:          2 (1 buy / 1 sell)"));
    assert!(text.contains("Cost Paid:      0.2"));
    assert_eq!(report.series().len(), 3);
    assert_eq!(report.summary().fill_count, 2);
}

#[test]
fn identical_inputs_identical_results() {
    let run = || {
        run_backtest(
            &scenario_config(),
            scenario_bars(),
            ts(0),
            ts(360),
            res("3m"),
            BacktesterKind::GridStrike,
            &CancelHandle::new(),
        )
        .unwrap()
    };
    assert_eq!(run(), run());

    let fp = RunFingerprint::compute(&scenario_config(), &scenario_bars(), ts(0), ts(360));
    let again = RunFingerprint::compute(&scenario_config(), &scenario_bars(), ts(0), ts(360));
    assert_eq!(fp.run_id, again.run_id);
}
