//! Artifact export: JSON and CSV.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: equity series, fills, level history and rebalances for
//!   external analysis tools
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gridstrike_core::domain::{GridLevel, PositionSnapshot};
use gridstrike_core::engine::{ExecutedFill, RebalanceEvent, RebalanceReason};
use gridstrike_core::report::ResultsReport;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

pub const SUMMARY_FILE: &str = "summary.json";

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting schema versions newer than ours.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV ────────────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per bar: mark, inventory and equity components.
pub fn export_equity_csv(snapshots: &[PositionSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "bar_index",
        "timestamp",
        "mark_price",
        "net_size",
        "cost_basis",
        "realized_pnl",
        "unrealized_pnl",
        "cost_paid",
        "equity",
    ])?;
    for s in snapshots {
        wtr.write_record([
            s.bar_index.to_string(),
            s.timestamp.to_rfc3339(),
            s.mark_price.to_string(),
            s.net_size.to_string(),
            s.cost_basis.to_string(),
            s.realized_pnl.to_string(),
            s.unrealized_pnl.to_string(),
            s.cost_paid.to_string(),
            s.equity.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn export_fills_csv(fills: &[ExecutedFill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "fill_id",
        "level_id",
        "generation",
        "side",
        "price",
        "size",
        "notional",
        "cost",
        "realized_pnl",
        "bar_index",
        "timestamp",
    ])?;
    for f in fills {
        let e = &f.fill;
        wtr.write_record([
            e.id.to_string(),
            e.level_id.to_string(),
            e.generation().to_string(),
            e.side.to_string(),
            e.price.to_string(),
            e.size.to_string(),
            e.notional().to_string(),
            f.cost.to_string(),
            f.realized_pnl.to_string(),
            e.bar_index.to_string(),
            e.timestamp.to_rfc3339(),
        ])?;
    }
    finish(wtr)
}

/// Full level history across generations with final status.
pub fn export_levels_csv(levels: &[GridLevel]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["level_id", "generation", "rung", "side", "price", "size", "status"])?;
    for l in levels {
        wtr.write_record([
            l.id.to_string(),
            l.generation().to_string(),
            l.rung.to_string(),
            l.side.to_string(),
            l.price.to_string(),
            l.size.to_string(),
            l.status.to_string(),
        ])?;
    }
    finish(wtr)
}

fn reason_label(reason: &RebalanceReason) -> String {
    match reason {
        RebalanceReason::PriceDrift { drift } => format!("price_drift({drift})"),
        RebalanceReason::BarInterval { bars } => format!("bar_interval({bars})"),
        RebalanceReason::SideExhausted => "side_exhausted".to_string(),
    }
}

pub fn export_rebalances_csv(events: &[RebalanceEvent]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "bar_index",
        "timestamp",
        "from_generation",
        "to_generation",
        "old_reference",
        "new_reference",
        "cancelled",
        "reason",
    ])?;
    for r in events {
        wtr.write_record([
            r.bar_index.to_string(),
            r.timestamp.to_rfc3339(),
            r.from_generation.to_string(),
            r.to_generation.to_string(),
            r.old_reference.to_string(),
            r.new_reference.to_string(),
            r.cancelled.to_string(),
            reason_label(&r.reason),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single run.
///
/// Creates `{symbol}_{run id prefix}/` under `output_dir` containing:
/// - `summary.json`: the full `BacktestResult`
/// - `equity.csv`, `fills.csv`, `levels.csv`, `rebalances.csv`
/// - `report.txt`: the rendered text report
///
/// Returns the path to the created directory. Re-saving the same run
/// overwrites it.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!("{}_{}", result.symbol(), result.run_id.short());
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        (SUMMARY_FILE, export_json(result)?),
        ("equity.csv", export_equity_csv(&result.result.snapshots)?),
        ("fills.csv", export_fills_csv(&result.result.fills)?),
        ("levels.csv", export_levels_csv(&result.result.levels)?),
        ("rebalances.csv", export_rebalances_csv(&result.result.rebalances)?),
        ("report.txt", ResultsReport::new(&result.result).render()),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's summary.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join(SUMMARY_FILE);
    let json = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
