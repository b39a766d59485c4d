//! Run fingerprints: config hash, dataset hash and run ID.
//!
//! Two runs with the same fingerprint replay identical bars through an
//! identical config and must produce identical results.

use crate::config::GridConfig;
use crate::data::dataset_hash;
use crate::domain::{Bar, ConfigHash, DatasetHash, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn config_hash(config: &GridConfig) -> ConfigHash {
    ConfigHash::from_bytes(&config.canonical_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub config_hash: ConfigHash,
    pub dataset_hash: DatasetHash,
    pub run_id: RunId,
}

impl RunFingerprint {
    /// Only bars inside `[start, end]` are hashed, matching what the clock replays.
    pub fn compute(config: &GridConfig, bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let config_hash = config_hash(config);
        let replayed: Vec<Bar> = bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect();
        let dataset_hash = dataset_hash(&config.symbol, &replayed);
        let run_id = RunId::derive(&config_hash, &dataset_hash, start.timestamp(), end.timestamp());
        Self {
            config_hash,
            dataset_hash,
            run_id,
        }
    }
}
