//! Backtest runner: wires config, bar loading, engine, and statistics.
//!
//! Two entry points:
//! - `run_single_backtest()`: loads bars per the config, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded bars. Used by the sweep.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use revertlab_core::domain::{Bar, Fill, TradeRecord};
use revertlab_core::engine::{run_backtest, EquityPoint, ExecutionConfig};
use revertlab_core::strategy::{JournalEntry, StrategyParams};

use crate::config::{validate_strategy, BacktestConfig, ConfigError};
use crate::data_loader::{load_bars, LoadError, LoadOptions};
use crate::metrics::TradeStats;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("no bars to backtest")]
    NoBars,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// BLAKE3 over symbol, parameters, broker settings, and dataset hash.
    pub run_id: String,
    pub symbol: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub params: StrategyParams,
    pub broker: ExecutionConfig,
    pub stats: TradeStats,
    pub trades: Vec<TradeRecord>,
    pub fills: Vec<Fill>,
    pub journal: Vec<JournalEntry>,
    pub equity_curve: Vec<EquityPoint>,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub bar_count: usize,
    /// Entry orders submitted (one per signal day at most).
    pub signal_count: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    pub fn final_value(&self) -> f64 {
        self.stats.final_value
    }

    pub fn short_id(&self) -> &str {
        let n = self.run_id.len().min(12);
        &self.run_id[..n]
    }
}

/// Run a single backtest from a `BacktestConfig`.
///
/// Dates in `opts` take precedence over the config's `[data]` window.
pub fn run_single_backtest(
    config: &BacktestConfig,
    opts: &LoadOptions,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let opts = LoadOptions {
        start: opts.start.or(config.data.start),
        end: opts.end.or(config.data.end),
        synthetic: opts.synthetic,
    };
    let loaded = load_bars(
        config.data.path.as_deref(),
        &config.data.symbol,
        config.data.timeframe_minutes,
        &opts,
    )?;

    run_backtest_from_data(
        &config.strategy,
        &config.broker,
        &loaded.bars,
        &config.data.symbol,
        &loaded.dataset_hash,
        loaded.has_synthetic,
    )
}

/// Run a backtest with pre-loaded bars. No I/O.
pub fn run_backtest_from_data(
    params: &StrategyParams,
    broker: &ExecutionConfig,
    bars: &[Bar],
    symbol: &str,
    dataset_hash: &str,
    has_synthetic: bool,
) -> Result<BacktestResult, RunError> {
    validate_strategy(params)?;
    let (first, last) = match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return Err(RunError::NoBars),
    };
    let run_id = result_id(symbol, params, broker, dataset_hash)?;

    let result = run_backtest(bars, params, broker);
    let stats = TradeStats::compute(&result);

    info!(
        symbol,
        run_id = &run_id[..12],
        bars = bars.len(),
        trades = stats.closed_trades,
        final_value = stats.final_value,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        symbol: symbol.to_string(),
        start: first,
        end: last,
        params: params.clone(),
        broker: broker.clone(),
        stats,
        signal_count: result.signal_days.len(),
        bar_count: result.bar_count,
        trades: result.trades,
        fills: result.fills,
        journal: result.journal,
        equity_curve: result.equity_curve,
        dataset_hash: dataset_hash.to_string(),
        has_synthetic,
    })
}

#[derive(Serialize)]
struct RunKey<'a> {
    symbol: &'a str,
    params: &'a StrategyParams,
    broker: &'a ExecutionConfig,
    dataset_hash: &'a str,
}

fn result_id(
    symbol: &str,
    params: &StrategyParams,
    broker: &ExecutionConfig,
    dataset_hash: &str,
) -> Result<String, ConfigError> {
    let key = RunKey {
        symbol,
        params,
        broker,
        dataset_hash,
    };
    let json = serde_json::to_vec(&key)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::generate_synthetic_bars;
    use chrono::NaiveDate;

    fn bars() -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        generate_synthetic_bars("TEST", start, end, 30)
    }

    fn quiet() -> StrategyParams {
        StrategyParams {
            log_each_bar: false,
            ..StrategyParams::default()
        }
    }

    #[test]
    fn empty_bars_is_an_error() {
        let err = run_backtest_from_data(&quiet(), &ExecutionConfig::default(), &[], "X", "h", false)
            .unwrap_err();
        assert!(matches!(err, RunError::NoBars));
    }

    #[test]
    fn invalid_params_are_rejected_before_running() {
        let params = StrategyParams {
            mfi_period: 0,
            ..quiet()
        };
        let err = run_backtest_from_data(&params, &ExecutionConfig::default(), &bars(), "X", "h", true)
            .unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn result_carries_provenance_and_stats() {
        let bars = bars();
        let r = run_backtest_from_data(&quiet(), &ExecutionConfig::default(), &bars, "TEST", "abc", true)
            .unwrap();
        assert_eq!(r.schema_version, SCHEMA_VERSION);
        assert_eq!(r.run_id.len(), 64);
        assert_eq!(r.short_id().len(), 12);
        assert_eq!(r.bar_count, bars.len());
        assert_eq!(r.equity_curve.len(), bars.len());
        assert_eq!(r.start, bars[0].timestamp);
        assert_eq!(r.end, bars[bars.len() - 1].timestamp);
        assert_eq!(r.stats.closed_trades, r.trades.len());
        assert_eq!(r.stats.start_value, 500.0);
        assert!(r.has_synthetic);
    }

    #[test]
    fn run_id_is_deterministic_and_parameter_sensitive() {
        let bars = bars();
        let exec = ExecutionConfig::default();
        let a = run_backtest_from_data(&quiet(), &exec, &bars, "TEST", "abc", true).unwrap();
        let b = run_backtest_from_data(&quiet(), &exec, &bars, "TEST", "abc", true).unwrap();
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a.stats, b.stats);

        let other = StrategyParams {
            tp_initial: 0.02,
            ..quiet()
        };
        let c = run_backtest_from_data(&other, &exec, &bars, "TEST", "abc", true).unwrap();
        assert_ne!(a.run_id, c.run_id);
    }
}
