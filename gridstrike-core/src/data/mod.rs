//! Market data: resolutions, the source abstraction, resampling and synthetic bars.
//!
//! The core never touches the filesystem or the network. A `MarketDataSource`
//! hands the engine an already-ordered `Vec<Bar>`; the runner provides the
//! disk-backed implementation.

pub mod resample;
pub mod resolution;
pub mod source;
pub mod synthetic;

pub use resample::{aggregate_bars, aggregate_window, resample_trades, resample_trades_window, TradeTick};
pub use resolution::{Resolution, ResolutionUnit};
pub use source::{dataset_hash, InMemorySource, MarketDataSource};
pub use synthetic::generate_synthetic_bars;

use crate::domain::BarError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from market data sources and transforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("no data for {symbol} in [{start}, {end}]")]
    DataUnavailable {
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid resolution '{0}'")]
    InvalidResolution(String),

    #[error("timestamps not increasing: {current} follows {previous}")]
    NonMonotonic {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error(transparent)]
    InvalidBar(#[from] BarError),

    #[error("data source failure: {0}")]
    Source(String),
}
