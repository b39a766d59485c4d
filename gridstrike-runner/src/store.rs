//! On-disk CSV bar store.
//!
//! Layout: `{root}/{SYMBOL}/{resolution}.csv`, plus `{root}/{SYMBOL}/trades.csv`
//! for raw trade tapes and `{root}/{SYMBOL}/meta.json` describing every
//! stored series.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Coarser requests served by aggregating a finer stored series
//! - Trade tapes resampled on demand when no bar series fits
//! - Metadata sidecar per symbol (count, range, hash, source)

use chrono::{DateTime, Utc};
use gridstrike_core::data::{
    aggregate_window, resample_trades, resample_trades_window, DataError, MarketDataSource,
    Resolution, TradeTick,
};
use gridstrike_core::domain::Bar;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

const TRADES_FILE: &str = "trades.csv";
const META_FILE: &str = "meta.json";
const BAR_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];
const TRADE_HEADER: [&str; 3] = ["timestamp", "price", "size"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("bad metadata {path}: {source}")]
    Meta {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),

    #[error("no bars to store for '{0}'")]
    Empty(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        StoreError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<StoreError> for DataError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Data(inner) => inner,
            other => DataError::Source(other.to_string()),
        }
    }
}

/// Sidecar entry for one stored bar series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub resolution: Resolution,
    pub bar_count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    /// BLAKE3 of the CSV file bytes.
    pub content_hash: String,
    pub source: String,
    pub stored_at: DateTime<Utc>,
}

/// Contents of `meta.json` for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub symbol: String,
    /// Keyed by resolution label.
    #[serde(default)]
    pub series: BTreeMap<String, SeriesMeta>,
}

/// Where `fetch` found a symbol's bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Stored,
    Aggregated(Resolution),
    Trades,
}

pub struct CsvBarStore {
    root: PathBuf,
}

impl CsvBarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn symbol_dir(&self, symbol: &str) -> Result<PathBuf, StoreError> {
        let bad = symbol.is_empty()
            || symbol == "."
            || symbol == ".."
            || symbol.contains(['/', '\\']);
        if bad {
            return Err(StoreError::InvalidSymbol(symbol.to_string()));
        }
        Ok(self.root.join(symbol))
    }

    pub fn bars_path(&self, symbol: &str, resolution: Resolution) -> Result<PathBuf, StoreError> {
        Ok(self.symbol_dir(symbol)?.join(format!("{resolution}.csv")))
    }

    pub fn trades_path(&self, symbol: &str) -> Result<PathBuf, StoreError> {
        Ok(self.symbol_dir(symbol)?.join(TRADES_FILE))
    }

    fn meta_path(&self, symbol: &str) -> Result<PathBuf, StoreError> {
        Ok(self.symbol_dir(symbol)?.join(META_FILE))
    }

    /// Store a bar series, replacing any existing one at that resolution.
    ///
    /// Bars must be valid and strictly increasing. Updates the sidecar.
    pub fn write_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        bars: &[Bar],
        source: &str,
    ) -> Result<SeriesMeta, StoreError> {
        let (first, last) = match (bars.first(), bars.last()) {
            (Some(f), Some(l)) => (f.timestamp, l.timestamp),
            _ => return Err(StoreError::Empty(symbol.to_string())),
        };
        check_series(bars)?;

        let dir = self.symbol_dir(symbol)?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = self.bars_path(symbol, resolution)?;
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(BAR_HEADER)
            .map_err(|e| StoreError::csv(&path, e))?;
        for bar in bars {
            writer
                .write_record([
                    bar.epoch_secs().to_string(),
                    bar.open.to_string(),
                    bar.high.to_string(),
                    bar.low.to_string(),
                    bar.close.to_string(),
                    bar.volume.to_string(),
                ])
                .map_err(|e| StoreError::csv(&path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::io(&path, e.into_error()))?;
        write_atomic(&path, &bytes)?;

        let entry = SeriesMeta {
            resolution,
            bar_count: bars.len(),
            first,
            last,
            content_hash: blake3::hash(&bytes).to_hex().to_string(),
            source: source.to_string(),
            stored_at: Utc::now(),
        };
        let mut meta = self.meta(symbol)?.unwrap_or_else(|| StoreMeta {
            symbol: symbol.to_string(),
            series: BTreeMap::new(),
        });
        meta.series.insert(resolution.to_string(), entry.clone());
        self.write_meta(symbol, &meta)?;

        info!(symbol, %resolution, bars = bars.len(), source, "stored bars");
        Ok(entry)
    }

    /// Read a stored bar series in full.
    pub fn read_bars(&self, symbol: &str, resolution: Resolution) -> Result<Vec<Bar>, StoreError> {
        let path = self.bars_path(symbol, resolution)?;
        let mut reader = open_csv(&path)?;
        let mut bars = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| StoreError::csv(&path, e))?;
            let bar = parse_bar(&record).map_err(|reason| StoreError::Parse {
                path: path.clone(),
                line: line_of(&record),
                reason,
            })?;
            bars.push(bar);
        }
        check_series(&bars)?;
        Ok(bars)
    }

    /// Write a raw trade tape for a symbol.
    pub fn write_trades(&self, symbol: &str, trades: &[TradeTick]) -> Result<(), StoreError> {
        let dir = self.symbol_dir(symbol)?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = self.trades_path(symbol)?;
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(TRADE_HEADER)
            .map_err(|e| StoreError::csv(&path, e))?;
        for t in trades {
            writer
                .write_record([
                    t.timestamp.timestamp().to_string(),
                    t.price.to_string(),
                    t.size.to_string(),
                ])
                .map_err(|e| StoreError::csv(&path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::io(&path, e.into_error()))?;
        write_atomic(&path, &bytes)
    }

    /// Read `trades.csv` for a symbol.
    pub fn read_trades(&self, symbol: &str) -> Result<Vec<TradeTick>, StoreError> {
        let path = self.trades_path(symbol)?;
        let mut reader = open_csv(&path)?;
        let mut trades = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| StoreError::csv(&path, e))?;
            let trade = parse_trade(&record).map_err(|reason| StoreError::Parse {
                path: path.clone(),
                line: line_of(&record),
                reason,
            })?;
            trades.push(trade);
        }
        Ok(trades)
    }

    /// Resample the symbol's trade tape and store the result.
    pub fn resample_and_store(
        &self,
        symbol: &str,
        resolution: Resolution,
    ) -> Result<SeriesMeta, StoreError> {
        let trades = self.read_trades(symbol)?;
        let bars = resample_trades(&trades, resolution)?;
        self.write_bars(symbol, resolution, &bars, "trades")
    }

    /// Sidecar for a symbol, `None` if nothing is stored.
    pub fn meta(&self, symbol: &str) -> Result<Option<StoreMeta>, StoreError> {
        let path = self.meta_path(symbol)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let meta = serde_json::from_str(&text).map_err(|source| StoreError::Meta {
            path: path.clone(),
            source,
        })?;
        Ok(Some(meta))
    }

    fn write_meta(&self, symbol: &str, meta: &StoreMeta) -> Result<(), StoreError> {
        let path = self.meta_path(symbol)?;
        let json = serde_json::to_vec_pretty(meta).map_err(|source| StoreError::Meta {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json)
    }

    /// Every symbol with a sidecar, sorted by symbol. A missing root is empty.
    ///
    /// Unreadable sidecars are skipped with a warning.
    pub fn status(&self) -> Result<Vec<StoreMeta>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))? {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(symbol) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.meta(&symbol) {
                Ok(Some(meta)) => out.push(meta),
                Ok(None) => {}
                Err(e) => warn!(symbol, error = %e, "skipping unreadable sidecar"),
            }
        }
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(out)
    }

    /// Finest stored resolution that `target` is a whole multiple of.
    fn finer_series(&self, symbol: &str, target: Resolution) -> Result<Option<Resolution>, StoreError> {
        let Some(meta) = self.meta(symbol)? else {
            return Ok(None);
        };
        let best = meta
            .series
            .values()
            .map(|s| s.resolution)
            .filter(|r| r.seconds() < target.seconds() && target.is_multiple_of(r))
            .max_by_key(|r| r.seconds());
        Ok(best)
    }

    /// Bars inside `[start, end]`, from the first tier that has any data.
    fn load_window(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(Vec<Bar>, Origin)>, StoreError> {
        if self.bars_path(symbol, resolution)?.exists() {
            let bars = self
                .read_bars(symbol, resolution)?
                .into_iter()
                .filter(|b| b.timestamp >= start && b.timestamp <= end)
                .collect();
            return Ok(Some((bars, Origin::Stored)));
        }
        if let Some(finer) = self.finer_series(symbol, resolution)? {
            let bars = aggregate_window(&self.read_bars(symbol, finer)?, resolution, start, end)?;
            return Ok(Some((bars, Origin::Aggregated(finer))));
        }
        if self.trades_path(symbol)?.exists() {
            let bars = resample_trades_window(&self.read_trades(symbol)?, resolution, start, end)?;
            return Ok(Some((bars, Origin::Trades)));
        }
        Ok(None)
    }
}

impl MarketDataSource for CsvBarStore {
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
        let Some((window, origin)) = self.load_window(symbol, resolution, start, end)? else {
            return Err(unavailable());
        };
        match origin {
            Origin::Stored => debug!(symbol, %resolution, "using stored bars"),
            Origin::Aggregated(finer) => {
                debug!(symbol, %resolution, %finer, "aggregating finer stored bars")
            }
            Origin::Trades => warn!(symbol, %resolution, "no stored bars, resampling trade tape"),
        }

        if window.is_empty() {
            return Err(unavailable());
        }
        Ok(window)
    }

    fn name(&self) -> &str {
        "csv-store"
    }
}

fn check_series(bars: &[Bar]) -> Result<(), DataError> {
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DataError::NonMonotonic {
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    for bar in bars {
        bar.validate()?;
    }
    Ok(())
}

/// Write to `{path}.tmp` then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })
}

fn open_csv(path: &Path) -> Result<csv::Reader<fs::File>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn timestamp_at(record: &csv::StringRecord, idx: usize) -> Result<DateTime<Utc>, String> {
    let raw = record
        .get(idx)
        .ok_or_else(|| "missing column timestamp".to_string())?;
    let secs: i64 = raw
        .parse()
        .map_err(|e| format!("timestamp {raw:?}: {e}"))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("timestamp {secs} out of range"))
}

fn decimal_at(record: &csv::StringRecord, idx: usize, name: &str) -> Result<Decimal, String> {
    let raw = record
        .get(idx)
        .ok_or_else(|| format!("missing column {name}"))?;
    Decimal::from_str(raw).map_err(|e| format!("{name} {raw:?}: {e}"))
}

fn parse_bar(record: &csv::StringRecord) -> Result<Bar, String> {
    Ok(Bar {
        timestamp: timestamp_at(record, 0)?,
        open: decimal_at(record, 1, "open")?,
        high: decimal_at(record, 2, "high")?,
        low: decimal_at(record, 3, "low")?,
        close: decimal_at(record, 4, "close")?,
        volume: decimal_at(record, 5, "volume")?,
    })
}

fn parse_trade(record: &csv::StringRecord) -> Result<TradeTick, String> {
    Ok(TradeTick {
        timestamp: timestamp_at(record, 0)?,
        price: decimal_at(record, 1, "price")?,
        size: decimal_at(record, 2, "size")?,
    })
}
