//! GridStrike Core: grid strategy planning, order-book simulation, ledger, replay loop.
//!
//! This crate contains the heart of the backtesting engine:
//! - Domain types (bars, grid levels, fills, position snapshots, IDs)
//! - Grid configuration and validation
//! - Market data abstraction, resolutions, resampling
//! - Grid level planner, order book simulator, position ledger
//! - Bar-by-bar replay loop with an explicit lifecycle
//! - Results report and run fingerprints
//!
//! No filesystem or network access happens here.

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod report;

pub use config::{ConfigError, GridConfig, RebalanceTrigger, ReferencePrice, SpacingType};
pub use engine::{BacktestEngine, BacktesterKind, CancelHandle, EngineError, RunResult, RunSummary};
pub use report::{summarize_series, EquityPoint, ResultsReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across threads by the runner are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::GridLevel>();
        require_sync::<domain::GridLevel>();
        require_send::<domain::FillEvent>();
        require_sync::<domain::FillEvent>();
        require_send::<domain::PositionSnapshot>();
        require_sync::<domain::PositionSnapshot>();

        require_send::<GridConfig>();
        require_sync::<GridConfig>();
        require_send::<RunResult>();
        require_sync::<RunResult>();
        require_send::<EngineError>();
        require_sync::<EngineError>();
        require_send::<CancelHandle>();
        require_sync::<CancelHandle>();

        require_send::<data::InMemorySource>();
        require_sync::<data::InMemorySource>();
        require_send::<engine::OrderBookSimulator>();
        require_sync::<engine::OrderBookSimulator>();
        require_send::<engine::GridStrikeBacktester>();
        require_send::<Box<dyn engine::StrategyBacktester>>();
    }

    /// The backtester trait is object-safe and usable behind a box.
    #[test]
    fn backtester_trait_object_builds() {
        use rust_decimal_macros::dec;
        let config = GridConfig::new("X", SpacingType::Absolute, dec!(1), 1, dec!(1));
        let bt = engine::build_backtester(BacktesterKind::GridStrike, &config).unwrap();
        assert_eq!(bt.kind(), BacktesterKind::GridStrike);
        assert_eq!(bt.generations(), 0);
    }
}
