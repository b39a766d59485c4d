//! GridStrike Runner: config loading, bar storage, run invocation, batch runs, artifacts.
//!
//! Everything with side effects lives here: reading config files, the CSV bar
//! store, blocking-worker execution for async callers, rayon fan-out for
//! batches, and exporting results to disk.

pub mod batch;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod logging;
pub mod runner;
pub mod store;

pub use batch::{run_batch, run_batch_async, BatchEntry, BatchReport, BatchRequest};
pub use config::{ConfigLoader, LoadConfigError};
pub use data_loader::{load_bars, prefetch, DataOrigin, LoadError, LoadOptions, LoadedData};
pub use export::{load_artifacts, save_artifacts};
pub use runner::{run, run_blocking, run_on_data, BacktestResult, RunError, RunMetadata, RunRequest, SCHEMA_VERSION};
pub use store::{CsvBarStore, SeriesMeta, StoreError, StoreMeta};
