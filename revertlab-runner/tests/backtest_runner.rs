//! Integration tests for the runner: TOML config + CSV bars on disk through
//! the engine, statistics, and artifact export.

use std::io::Write;
use std::path::Path;

use revertlab_core::domain::OrderRole;
use revertlab_runner::config::BacktestConfig;
use revertlab_runner::data_loader::LoadOptions;
use revertlab_runner::export::{load_summary, save_artifacts};
use revertlab_runner::runner::{run_single_backtest, RunError};

const CONFIG: &str = r#"
[data]
symbol = "ADAUSDT"
timeframe_minutes = 30

[strategy]
mfi_period = 2
mfi_entry_level = 10.0
sizing = { units = 100.0 }
log_each_bar = false

[broker]
start_cash = 500.0
commission = 0.001
"#;

/// Two falling bars drive MFI(2) to 0 on bar 2 (market entry at 1.00), then
/// bar 3 trades up through the 1.015 take-profit. All bars share one day.
const TAKE_PROFIT_BARS: &str = "\
timestamp,open,high,low,close,volume
2024-01-02 00:00:00,1.10,1.10,1.10,1.10,1000
2024-01-02 00:30:00,1.05,1.05,1.05,1.05,1000
2024-01-02 01:00:00,1.00,1.00,1.00,1.00,1000
2024-01-02 01:30:00,1.00,1.02,0.995,1.01,1000
2024-01-02 02:00:00,1.01,1.01,1.01,1.01,1000
";

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn config_with_bars(dir: &Path, bars: &str) -> BacktestConfig {
    let config_path = write_file(dir, "revertlab.toml", CONFIG);
    let data_path = write_file(dir, "bars.csv", bars);
    BacktestConfig::from_file(&config_path)
        .unwrap()
        .with_data_path(data_path)
}

#[test]
fn take_profit_round_trip_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_bars(dir.path(), TAKE_PROFIT_BARS);

    let result = run_single_backtest(&config, &LoadOptions::default()).unwrap();

    assert_eq!(result.bar_count, 5);
    assert_eq!(result.signal_count, 1);
    assert!(!result.has_synthetic);

    let s = &result.stats;
    assert_eq!(s.closed_trades, 1);
    assert_eq!(s.wins, 1);
    assert_eq!(s.losses, 0);
    assert_eq!(s.take_profit_exits, 1);
    assert_eq!(s.scaled_trades, 0);
    // gross 100 * 0.015, commission 0.1 + 0.1015
    assert!((s.net_pnl - 1.2985).abs() < 1e-9, "net {}", s.net_pnl);
    assert!((s.final_value - 501.2985).abs() < 1e-9, "final {}", s.final_value);
    assert!((s.total_commission - 0.2015).abs() < 1e-9);

    let trade = &result.trades[0];
    assert_eq!(trade.entry_bar, 2);
    assert_eq!(trade.exit_bar, 3);
    assert_eq!(trade.exit_reason, OrderRole::TakeProfit);
    assert!((trade.avg_exit_price - 1.015).abs() < 1e-12);
}

#[test]
fn artifacts_reflect_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_bars(dir.path(), TAKE_PROFIT_BARS);
    let result = run_single_backtest(&config, &LoadOptions::default()).unwrap();

    let out = dir.path().join("out");
    let run_dir = save_artifacts(&result, &out).unwrap();

    let summary = load_summary(&run_dir).unwrap();
    assert_eq!(summary.run_id, result.run_id);
    assert_eq!(summary.stats, result.stats);

    let trades = std::fs::read_to_string(run_dir.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), 2);
    assert!(trades.contains("take_profit"));

    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    assert_eq!(equity.lines().count(), 1 + result.bar_count);

    let log = std::fs::read_to_string(run_dir.join("trade_log.txt")).unwrap();
    assert!(log.contains("ENTRY"));
    assert!(log.contains("TAKE-PROFIT"));
}

#[test]
fn date_window_from_config_limits_bars() {
    let dir = tempfile::tempdir().unwrap();
    let mut bars = String::from(TAKE_PROFIT_BARS);
    bars.push_str("2024-01-03 00:00:00,1.01,1.01,1.01,1.01,1000\n");
    let mut config = config_with_bars(dir.path(), &bars);
    config.data.end = chrono::NaiveDate::from_ymd_opt(2024, 1, 2);

    let result = run_single_backtest(&config, &LoadOptions::default()).unwrap();
    assert_eq!(result.bar_count, 5);
}

#[test]
fn same_inputs_same_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_bars(dir.path(), TAKE_PROFIT_BARS);
    let a = run_single_backtest(&config, &LoadOptions::default()).unwrap();
    let b = run_single_backtest(&config, &LoadOptions::default()).unwrap();
    assert_eq!(a.run_id, b.run_id);
    assert_eq!(a.dataset_hash, b.dataset_hash);
}

#[test]
fn missing_data_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = BacktestConfig::default().with_data_path(dir.path().join("nope.csv"));
    let err = run_single_backtest(&config, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, RunError::Data(_)));
}

#[test]
fn malformed_row_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let bars = "timestamp,open,high,low,close,volume\n2024-01-02 00:00:00,1.0,abc,1.0,1.0,10\n";
    let config = config_with_bars(dir.path(), bars);
    let err = run_single_backtest(&config, &LoadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("not a number"), "{err}");
}

#[test]
fn synthetic_fallback_is_tagged() {
    let config = BacktestConfig::default();
    let opts = LoadOptions {
        start: chrono::NaiveDate::from_ymd_opt(2024, 1, 1),
        end: chrono::NaiveDate::from_ymd_opt(2024, 1, 15),
        synthetic: true,
    };
    let result = run_single_backtest(&config, &opts).unwrap();
    assert!(result.has_synthetic);
    assert_eq!(result.bar_count, 15 * 48);
    assert_eq!(result.equity_curve.len(), result.bar_count);
}
