//! MarketDataSource: where the engine's bars come from.

use crate::data::{aggregate_window, DataError, Resolution};
use crate::domain::{Bar, DatasetHash};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies a time-ordered bar sequence for a symbol over `[start, end]`.
///
/// Implementations must return bars with strictly increasing timestamps and
/// fail with `DataError::DataUnavailable` rather than return an empty vector.
/// Retries, caching and downloading are the implementation's business; the
/// engine never retries.
pub trait MarketDataSource: Send + Sync {
    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Bar>, DataError>;

    /// Short label for logs and run metadata.
    fn name(&self) -> &str {
        "unknown"
    }
}

impl<T: MarketDataSource + ?Sized> MarketDataSource for Arc<T> {
    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Bar>, DataError> {
        (**self).fetch(symbol, start, end, resolution)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// In-memory bars per symbol, stored at one native resolution.
///
/// Coarser requests are served by aggregating the in-window bars when they
/// are a whole multiple of the native resolution.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    native: Resolution,
    bars: HashMap<String, Vec<Bar>>,
}

impl InMemorySource {
    pub fn new(native: Resolution) -> Self {
        Self {
            native,
            bars: HashMap::new(),
        }
    }

    /// Add (or replace) a symbol's bars. Rejects unordered or invalid bars.
    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Result<(), DataError> {
        for pair in bars.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(DataError::NonMonotonic {
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }
        for bar in &bars {
            bar.validate()?;
        }
        self.bars.insert(symbol.into(), bars);
        Ok(())
    }

    pub fn with_bars(
        native: Resolution,
        symbol: impl Into<String>,
        bars: Vec<Bar>,
    ) -> Result<Self, DataError> {
        let mut source = Self::new(native);
        source.insert(symbol, bars)?;
        Ok(source)
    }
}

impl MarketDataSource for InMemorySource {
    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Bar>, DataError> {
        let unavailable = || DataError::DataUnavailable {
            symbol: symbol.to_string(),
            start,
            end,
        };
        let stored = self.bars.get(symbol).ok_or_else(unavailable)?;

        let window: Vec<Bar> = if resolution == self.native {
            stored
                .iter()
                .filter(|b| b.timestamp >= start && b.timestamp <= end)
                .cloned()
                .collect()
        } else if resolution.is_multiple_of(&self.native) {
            aggregate_window(stored, resolution, start, end)?
        } else {
            return Err(DataError::InvalidResolution(format!(
                "{resolution} is not a multiple of native {}",
                self.native
            )));
        };
        if window.is_empty() {
            return Err(unavailable());
        }
        Ok(window)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// BLAKE3 over the symbol and every bar field.
///
/// Decimals are normalized first so `1.0` and `1.00` hash the same.
pub fn dataset_hash(symbol: &str, bars: &[Bar]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    for bar in bars {
        hasher.update(&bar.epoch_secs().to_le_bytes());
        hasher.update(&bar.open.normalize().serialize());
        hasher.update(&bar.high.normalize().serialize());
        hasher.update(&bar.low.normalize().serialize());
        hasher.update(&bar.close.normalize().serialize());
        hasher.update(&bar.volume.normalize().serialize());
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn minute_bars(n: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::flat(DateTime::from_timestamp(i * 60, 0).unwrap(), Decimal::from(100 + i)))
            .collect()
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn res(label: &str) -> Resolution {
        label.parse().unwrap()
    }

    #[test]
    fn window_is_inclusive() {
        let src = InMemorySource::with_bars(res("1m"), "X", minute_bars(10)).unwrap();
        let bars = src.fetch("X", ts(60), ts(180), res("1m")).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].epoch_secs(), 60);
        assert_eq!(bars[2].epoch_secs(), 180);
    }

    #[test]
    fn empty_window_is_unavailable() {
        let src = InMemorySource::with_bars(res("1m"), "X", minute_bars(10)).unwrap();
        let err = src.fetch("X", ts(10_000), ts(20_000), res("1m")).unwrap_err();
        assert!(matches!(err, DataError::DataUnavailable { .. }));
        let err = src.fetch("Y", ts(0), ts(600), res("1m")).unwrap_err();
        assert!(matches!(err, DataError::DataUnavailable { .. }));
    }

    #[test]
    fn coarser_resolution_is_aggregated() {
        let src = InMemorySource::with_bars(res("1m"), "X", minute_bars(9)).unwrap();
        let bars = src.fetch("X", ts(0), ts(600), res("3m")).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].open, dec!(103));
        assert_eq!(bars[1].close, dec!(105));
    }

    #[test]
    fn aggregated_window_stops_at_end() {
        let mut bars = minute_bars(6);
        bars[4].high = dec!(150);
        let src = InMemorySource::with_bars(res("1m"), "X", bars).unwrap();
        let agg = src.fetch("X", ts(0), ts(180), res("3m")).unwrap();
        let highs: Vec<(i64, Decimal)> = agg.iter().map(|b| (b.epoch_secs(), b.high)).collect();
        assert_eq!(highs, vec![(0, dec!(102)), (180, dec!(103))]);
    }

    #[test]
    fn non_multiple_resolution_rejected() {
        let src = InMemorySource::with_bars(res("2m"), "X", vec![]).unwrap();
        let err = src.fetch("X", ts(0), ts(600), res("3m")).unwrap_err();
        assert!(matches!(err, DataError::InvalidResolution(_)));
    }

    #[test]
    fn insert_rejects_unordered_bars() {
        let mut bars = minute_bars(3);
        bars.swap(0, 2);
        assert!(InMemorySource::with_bars(res("1m"), "X", bars).is_err());
    }

    #[test]
    fn dataset_hash_ignores_decimal_scale() {
        let a = vec![Bar::flat(ts(0), dec!(1.0))];
        let b = vec![Bar::flat(ts(0), dec!(1.00))];
        assert_eq!(dataset_hash("X", &a), dataset_hash("X", &b));
        assert_ne!(dataset_hash("X", &a), dataset_hash("Y", &a));
    }
}
