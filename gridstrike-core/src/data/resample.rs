//! Trade-tape resampling and bar aggregation.
//!
//! Buckets are aligned on `floor(ts / resolution) * resolution`, so the same
//! tape always produces the same bars regardless of where it starts.

use crate::data::{DataError, Resolution};
use crate::domain::Bar;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single print from a trade tape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub size: Decimal,
}

fn bucket_time(epoch_secs: i64) -> Result<DateTime<Utc>, DataError> {
    DateTime::from_timestamp(epoch_secs, 0)
        .ok_or_else(|| DataError::Source(format!("timestamp {epoch_secs} out of range")))
}

/// Build OHLCV bars from a time-ordered trade tape.
///
/// Buckets with no trades between the first and last trade become flat bars
/// at the previous close with zero volume. Equal timestamps are allowed
/// (several prints in the same second); decreasing ones are not.
pub fn resample_trades(trades: &[TradeTick], resolution: Resolution) -> Result<Vec<Bar>, DataError> {
    let step = resolution.seconds();
    let mut bars: Vec<Bar> = Vec::new();
    let mut previous: Option<DateTime<Utc>> = None;

    for trade in trades {
        if let Some(prev) = previous {
            if trade.timestamp < prev {
                return Err(DataError::NonMonotonic {
                    previous: prev,
                    current: trade.timestamp,
                });
            }
        }
        previous = Some(trade.timestamp);

        let bucket = resolution.bucket_start(trade.timestamp.timestamp());
        if let Some(bar) = bars.last_mut().filter(|b| b.epoch_secs() == bucket) {
            bar.high = bar.high.max(trade.price);
            bar.low = bar.low.min(trade.price);
            bar.close = trade.price;
            bar.volume += trade.size;
            continue;
        }

        if let Some((last_ts, close)) = bars.last().map(|b| (b.epoch_secs(), b.close)) {
            // Forward-fill empty buckets
            let mut ts = last_ts + step;
            while ts < bucket {
                bars.push(Bar::flat(bucket_time(ts)?, close));
                ts += step;
            }
        }
        bars.push(Bar {
            timestamp: bucket_time(bucket)?,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.size,
        });
    }

    for bar in &bars {
        bar.validate()?;
    }
    Ok(bars)
}

/// Combine finer bars into `resolution` buckets.
///
/// Open of the first bar, max high, min low, close of the last bar, summed
/// volume. Input timestamps must strictly increase. Empty buckets are skipped,
/// not filled.
pub fn aggregate_bars(bars: &[Bar], resolution: Resolution) -> Result<Vec<Bar>, DataError> {
    let mut out: Vec<Bar> = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
            return Err(DataError::NonMonotonic {
                previous: bars[i - 1].timestamp,
                current: bar.timestamp,
            });
        }
        let bucket = resolution.bucket_start(bar.epoch_secs());
        if let Some(agg) = out.last_mut().filter(|b| b.epoch_secs() == bucket) {
            agg.high = agg.high.max(bar.high);
            agg.low = agg.low.min(bar.low);
            agg.close = bar.close;
            agg.volume += bar.volume;
        } else {
            out.push(Bar {
                timestamp: bucket_time(bucket)?,
                ..bar.clone()
            });
        }
    }

    Ok(out)
}

/// Aggregate only the bars inside `[start, end]` to a coarser resolution.
///
/// Nothing outside the window leaks into a bucket. A leading bucket that
/// opens before `start` is stamped at its first in-window bar.
pub fn aggregate_window(
    bars: &[Bar],
    resolution: Resolution,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Bar>, DataError> {
    let inside: Vec<Bar> = bars
        .iter()
        .filter(|b| b.timestamp >= start && b.timestamp <= end)
        .cloned()
        .collect();
    let mut out = aggregate_bars(&inside, resolution)?;
    restamp_leading(&mut out, inside.first().map(|b| b.timestamp), start);
    Ok(out)
}

/// Resample only the trades inside `[start, end]`, stamped like `aggregate_window`.
pub fn resample_trades_window(
    trades: &[TradeTick],
    resolution: Resolution,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Bar>, DataError> {
    let inside: Vec<TradeTick> = trades
        .iter()
        .filter(|t| t.timestamp >= start && t.timestamp <= end)
        .cloned()
        .collect();
    let mut out = resample_trades(&inside, resolution)?;
    restamp_leading(&mut out, inside.first().map(|t| t.timestamp), start);
    Ok(out)
}

fn restamp_leading(out: &mut [Bar], first_inside: Option<DateTime<Utc>>, start: DateTime<Utc>) {
    if let (Some(bar), Some(ts)) = (out.first_mut(), first_inside) {
        if bar.timestamp < start {
            bar.timestamp = ts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(secs: i64, price: Decimal, size: Decimal) -> TradeTick {
        TradeTick {
            timestamp: DateTime::from_timestamp(secs, 0).unwrap(),
            price,
            size,
        }
    }

    fn res(label: &str) -> Resolution {
        label.parse().unwrap()
    }

    #[test]
    fn single_bucket_ohlcv() {
        let trades = vec![
            tick(60, dec!(100), dec!(1)),
            tick(70, dec!(102), dec!(2)),
            tick(80, dec!(99), dec!(1)),
            tick(119, dec!(101), dec!(0.5)),
        ];
        let bars = resample_trades(&trades, res("1m")).unwrap();
        assert_eq!(bars.len(), 1);
        let b = &bars[0];
        assert_eq!(b.epoch_secs(), 60);
        assert_eq!((b.open, b.high, b.low, b.close), (dec!(100), dec!(102), dec!(99), dec!(101)));
        assert_eq!(b.volume, dec!(4.5));
    }

    #[test]
    fn gaps_are_forward_filled() {
        let trades = vec![tick(0, dec!(100), dec!(1)), tick(200, dec!(103), dec!(1))];
        let bars = resample_trades(&trades, res("1m")).unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[1], Bar::flat(DateTime::from_timestamp(60, 0).unwrap(), dec!(100)));
        assert_eq!(bars[2].close, dec!(100));
        assert_eq!(bars[2].volume, Decimal::ZERO);
        assert_eq!(bars[3].epoch_secs(), 180);
        assert_eq!(bars[3].open, dec!(103));
    }

    #[test]
    fn decreasing_timestamps_rejected() {
        let trades = vec![tick(100, dec!(1), dec!(1)), tick(50, dec!(1), dec!(1))];
        assert!(matches!(
            resample_trades(&trades, res("1m")),
            Err(DataError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn empty_tape_gives_no_bars() {
        assert!(resample_trades(&[], res("1m")).unwrap().is_empty());
    }

    #[test]
    fn aggregates_minutes_into_three_minute_bars() {
        let bars: Vec<Bar> = (0..6)
            .map(|i| Bar {
                timestamp: DateTime::from_timestamp(i * 60, 0).unwrap(),
                open: Decimal::from(100 + i),
                high: Decimal::from(101 + i),
                low: Decimal::from(99 + i),
                close: Decimal::from(100 + i),
                volume: dec!(10),
            })
            .collect();
        let agg = aggregate_bars(&bars, res("3m")).unwrap();
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].open, dec!(100));
        assert_eq!(agg[0].high, dec!(103));
        assert_eq!(agg[0].low, dec!(99));
        assert_eq!(agg[0].close, dec!(102));
        assert_eq!(agg[0].volume, dec!(30));
        assert_eq!(agg[1].epoch_secs(), 180);
    }

    #[test]
    fn aggregate_rejects_duplicates() {
        let bar = Bar::flat(DateTime::from_timestamp(0, 0).unwrap(), dec!(1));
        assert!(aggregate_bars(&[bar.clone(), bar], res("3m")).is_err());
    }

    fn minute_bars_with_spike() -> Vec<Bar> {
        (0..6)
            .map(|i| {
                let mut bar = Bar::flat(DateTime::from_timestamp(i * 60, 0).unwrap(), dec!(100));
                if i == 4 {
                    bar.high = dec!(150);
                }
                bar
            })
            .collect()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn window_aggregation_ignores_bars_after_end() {
        let agg = aggregate_window(&minute_bars_with_spike(), res("3m"), at(0), at(180)).unwrap();
        let highs: Vec<(i64, Decimal)> = agg.iter().map(|b| (b.epoch_secs(), b.high)).collect();
        assert_eq!(highs, vec![(0, dec!(100)), (180, dec!(100))]);
        assert_eq!(agg[1].volume, Decimal::ZERO);
    }

    #[test]
    fn window_aggregation_keeps_partial_leading_bucket() {
        let agg = aggregate_window(&minute_bars_with_spike(), res("3m"), at(60), at(300)).unwrap();
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].epoch_secs(), 60);
        assert_eq!(agg[1].epoch_secs(), 180);
        assert_eq!(agg[1].high, dec!(150));
    }

    #[test]
    fn window_resample_ignores_trades_after_end() {
        let trades = vec![
            tick(0, dec!(100), dec!(1)),
            tick(100, dec!(101), dec!(1)),
            tick(200, dec!(102), dec!(1)),
            tick(250, dec!(150), dec!(1)),
        ];
        let bars = resample_trades_window(&trades, res("3m"), at(0), at(200)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].epoch_secs(), 180);
        assert_eq!((bars[1].high, bars[1].close), (dec!(102), dec!(102)));

        let bars = resample_trades_window(&trades, res("3m"), at(100), at(300)).unwrap();
        assert_eq!(bars[0].epoch_secs(), 100);
        assert_eq!(bars[0].open, dec!(101));
    }
}
