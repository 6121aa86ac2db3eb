//! RevertLab Runner: backtest orchestration, reporting, and parameter sweeps.
//!
//! This crate builds on `revertlab-core` to provide:
//! - TOML configuration with validation and content-addressed run ids
//! - CSV bar loading with a seeded synthetic fallback
//! - Single-backtest runner with trade statistics
//! - Artifact export (summary JSON, trade and equity CSV, trade log)
//! - Parallel grid sweep over the entry, take-profit, and scale-in offsets

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError, DataConfig, SweepConfig};
pub use data_loader::{load_bars, DataSource, LoadError, LoadOptions, LoadedData};
pub use export::{save_artifacts, RunSummary};
pub use metrics::TradeStats;
pub use runner::{run_backtest_from_data, run_single_backtest, BacktestResult, RunError};
pub use sweep::{optimize, ParamGrid, SweepResults};
