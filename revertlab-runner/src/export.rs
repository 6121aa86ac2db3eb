//! Reporting and export: JSON summary, CSV trade tape and equity curve, and
//! the human-readable trade log.
//!
//! Persisted summaries carry a `schema_version`. Unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use revertlab_core::domain::TradeRecord;
use revertlab_core::engine::{EquityPoint, ExecutionConfig};
use revertlab_core::strategy::{JournalEntry, StrategyParams};

use crate::metrics::TradeStats;
use crate::runner::{BacktestResult, SCHEMA_VERSION};

/// Compact result summary written as `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub run_id: String,
    pub symbol: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub bar_count: usize,
    pub signal_count: usize,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub params: StrategyParams,
    pub broker: ExecutionConfig,
    pub stats: TradeStats,
}

impl From<&BacktestResult> for RunSummary {
    fn from(r: &BacktestResult) -> Self {
        Self {
            schema_version: r.schema_version,
            run_id: r.run_id.clone(),
            symbol: r.symbol.clone(),
            start: r.start,
            end: r.end,
            bar_count: r.bar_count,
            signal_count: r.signal_count,
            dataset_hash: r.dataset_hash.clone(),
            has_synthetic: r.has_synthetic,
            params: r.params.clone(),
            broker: r.broker.clone(),
            stats: r.stats.clone(),
        }
    }
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_summary_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(&RunSummary::from(result))
        .context("failed to serialize run summary to JSON")
}

/// Deserialize a `RunSummary`, rejecting unknown schema versions.
pub fn import_summary_json(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize run summary from JSON")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export closed trades as CSV.
///
/// Columns: entry_bar, entry_time, exit_bar, exit_time, first_entry_price,
/// avg_entry_price, avg_exit_price, max_quantity, scaled_in, exit_reason,
/// gross_pnl, commission, net_pnl, bars_held
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "entry_bar",
        "entry_time",
        "exit_bar",
        "exit_time",
        "first_entry_price",
        "avg_entry_price",
        "avg_exit_price",
        "max_quantity",
        "scaled_in",
        "exit_reason",
        "gross_pnl",
        "commission",
        "net_pnl",
        "bars_held",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.entry_bar.to_string(),
            &t.entry_time.to_string(),
            &t.exit_bar.to_string(),
            &t.exit_time.to_string(),
            &format!("{:.6}", t.first_entry_price),
            &format!("{:.6}", t.avg_entry_price),
            &format!("{:.6}", t.avg_exit_price),
            &format!("{:.6}", t.max_quantity),
            &t.scaled_in.to_string(),
            &t.exit_reason.to_string(),
            &format!("{:.4}", t.gross_pnl),
            &format!("{:.4}", t.commission),
            &format!("{:.4}", t.net_pnl),
            &t.bars_held.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the mark-to-market curve as CSV.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "timestamp", "equity", "cash", "position"])?;
    for p in equity_curve {
        wtr.write_record([
            &p.bar_index.to_string(),
            &p.timestamp.to_string(),
            &format!("{:.4}", p.equity),
            &format!("{:.4}", p.cash),
            &format!("{:.6}", p.position),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One line per journal entry, in event order.
pub fn format_trade_log(journal: &[JournalEntry]) -> String {
    let mut out = String::with_capacity(journal.len() * 64);
    for entry in journal {
        out.push_str(&entry.to_string());
        out.push('\n');
    }
    out
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{symbol}_{run_id[..12]}/` under `output_dir` containing:
/// - `summary.json`: parameters, broker settings, and statistics
/// - `trades.csv`: closed trades
/// - `equity.csv`: bar-by-bar equity curve
/// - `trade_log.txt`: lifecycle journal
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("{}_{}", result.symbol, result.short_id()));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("summary.json"), &export_summary_json(result)?)?;
    write(&run_dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
    write(&run_dir.join("equity.csv"), &export_equity_csv(&result.equity_curve)?)?;
    write(&run_dir.join("trade_log.txt"), &format_trade_log(&result.journal))?;

    Ok(run_dir)
}

/// Load the summary from an artifact directory.
pub fn load_summary(dir: &Path) -> Result<RunSummary> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_summary_json(&json)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
