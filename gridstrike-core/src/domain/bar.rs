//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single symbol over one resolution interval.
///
/// `timestamp` is the interval's opening instant. Prices and volume are exact
/// decimals so fills and PnL never accumulate binary rounding drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Why a bar failed its sanity check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarError {
    #[error("bar at {0}: high below low")]
    HighBelowLow(DateTime<Utc>),

    #[error("bar at {0}: open or close outside the high/low range")]
    OutsideRange(DateTime<Utc>),

    #[error("bar at {0}: non-positive price")]
    NonPositivePrice(DateTime<Utc>),

    #[error("bar at {0}: negative volume")]
    NegativeVolume(DateTime<Utc>),
}

impl Bar {
    /// Flat bar: all four prices equal. Used for forward-filled gaps.
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }

    /// Unix timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.timestamp.timestamp()
    }

    /// True if `price` lies within `[low, high]` (inclusive).
    pub fn spans(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }

    /// A bar that closes at or above its open is assumed to trade
    /// open → low → high → close.
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }

    /// OHLCV sanity check.
    pub fn validate(&self) -> Result<(), BarError> {
        if self.high < self.low {
            return Err(BarError::HighBelowLow(self.timestamp));
        }
        if !self.spans(self.open) || !self.spans(self.close) {
            return Err(BarError::OutsideRange(self.timestamp));
        }
        if self.low <= Decimal::ZERO {
            return Err(BarError::NonPositivePrice(self.timestamp));
        }
        if self.volume < Decimal::ZERO {
            return Err(BarError::NegativeVolume(self.timestamp));
        }
        Ok(())
    }

    pub fn is_sane(&self) -> bool {
        self.validate().is_ok()
    }
}
