//! Serializable backtest configuration, read from a single TOML file.
//!
//! ```toml
//! [data]
//! path = "data/ADAUSDT-30m.csv"
//! symbol = "ADAUSDT"
//! start = "2023-01-01"
//! end = "2025-12-31"
//! train_end = "2022-12-31"
//!
//! [strategy]
//! mfi_period = 10
//! mfi_entry_level = 10
//! sizing = { notional_usd = 50, round_digits = 2 }
//!
//! [broker]
//! start_cash = 500
//! commission = 0.001
//! fill_reporting = "sequential"
//!
//! [sweep]
//! tp_initial = [0.01, 0.015, 0.02]
//! ```
//!
//! Every section and field is optional; omitted values take the defaults.
//! The config is immutable once loaded and passed by reference to each run.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use revertlab_core::engine::ExecutionConfig;
use revertlab_core::strategy::{EntryOrder, Sizing, StrategyParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a backtest configuration (content-addressable hash).
pub type RunId = String;

/// Errors from reading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ── Sections ─────────────────────────────────────────────────────────

/// `[data]`: where bars come from and which window is backtested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV of (timestamp, open, high, low, close, volume, ...) rows.
    pub path: Option<PathBuf>,
    pub symbol: String,
    pub timeframe_minutes: u32,
    /// First calendar day of the backtest window (inclusive).
    pub start: Option<NaiveDate>,
    /// Last calendar day of the backtest window (inclusive).
    pub end: Option<NaiveDate>,
    /// Last in-sample day; the sweep only sees bars up to here.
    pub train_end: Option<NaiveDate>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            symbol: "ADAUSDT".into(),
            timeframe_minutes: 30,
            start: None,
            end: None,
            train_end: None,
        }
    }
}

/// `[sweep]`: parameter grid for `optimize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub first_entry_offset: Vec<f64>,
    pub tp_initial: Vec<f64>,
    pub scale_in_offset: Vec<f64>,
    /// Run grid points on the rayon thread pool.
    pub parallel: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            first_entry_offset: vec![0.03, 0.04, 0.05],
            tp_initial: vec![0.01, 0.015, 0.02],
            scale_in_offset: vec![0.03, 0.04, 0.05],
            parallel: true,
        }
    }
}

/// Complete configuration for a run or a sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data: DataConfig,
    pub strategy: StrategyParams,
    pub broker: ExecutionConfig,
    pub sweep: SweepConfig,
}

impl BacktestConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Override the data file (e.g. from `--data`).
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data.path = Some(path.into());
        self
    }

    /// Deterministic BLAKE3 hash over the canonical JSON of this config.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_strategy(&self.strategy)?;
        validate_broker(&self.broker)?;

        if let (Some(start), Some(end)) = (self.data.start, self.data.end) {
            if start > end {
                return Err(invalid("data.start", format!("{start} is after end {end}")));
            }
        }
        if self.data.timeframe_minutes == 0 {
            return Err(invalid("data.timeframe_minutes", "must be positive"));
        }

        for (field, grid) in [
            ("sweep.first_entry_offset", &self.sweep.first_entry_offset),
            ("sweep.tp_initial", &self.sweep.tp_initial),
            ("sweep.scale_in_offset", &self.sweep.scale_in_offset),
        ] {
            if grid.is_empty() {
                return Err(invalid(field, "grid must not be empty"));
            }
            if let Some(v) = grid.iter().find(|v| !is_fraction(**v)) {
                return Err(invalid(field, format!("{v} is not in (0, 1)")));
            }
        }
        Ok(())
    }
}

fn is_fraction(v: f64) -> bool {
    v.is_finite() && v > 0.0 && v < 1.0
}

/// Strategy parameter checks, shared with the sweep for each grid point.
pub fn validate_strategy(p: &StrategyParams) -> Result<(), ConfigError> {
    if p.mfi_period == 0 {
        return Err(invalid("strategy.mfi_period", "must be >= 1"));
    }
    if !(0.0..=100.0).contains(&p.mfi_entry_level) {
        return Err(invalid(
            "strategy.mfi_entry_level",
            format!("{} is outside [0, 100]", p.mfi_entry_level),
        ));
    }
    for (field, v) in [
        ("strategy.first_entry_offset", p.first_entry_offset),
        ("strategy.tp_initial", p.tp_initial),
        ("strategy.sl", p.sl),
        ("strategy.scale_in_offset", p.scale_in_offset),
        ("strategy.tp_after_scale", p.tp_after_scale),
    ] {
        if !is_fraction(v) {
            return Err(invalid(field, format!("{v} is not in (0, 1)")));
        }
    }
    if p.sl <= p.scale_in_offset {
        return Err(invalid(
            "strategy.sl",
            format!(
                "stop-loss {} must sit below the scale-in level {}",
                p.sl, p.scale_in_offset
            ),
        ));
    }
    if p.max_entries_per_day != 1 {
        return Err(invalid(
            "strategy.max_entries_per_day",
            "only one entry per day is supported",
        ));
    }
    if p.entry_order == EntryOrder::Limit && p.entry_expiration_days == 0 {
        return Err(invalid("strategy.entry_expiration_days", "must be >= 1"));
    }
    match p.sizing {
        Sizing::Units { units } if !(units.is_finite() && units > 0.0) => {
            Err(invalid("strategy.sizing.units", "must be positive"))
        }
        Sizing::Notional { notional_usd, .. } if !(notional_usd.is_finite() && notional_usd > 0.0) => {
            Err(invalid("strategy.sizing.notional_usd", "must be positive"))
        }
        _ => Ok(()),
    }
}

fn validate_broker(b: &ExecutionConfig) -> Result<(), ConfigError> {
    if !(b.start_cash.is_finite() && b.start_cash > 0.0) {
        return Err(invalid("broker.start_cash", "must be positive"));
    }
    if !(b.commission.is_finite() && (0.0..1.0).contains(&b.commission)) {
        return Err(invalid("broker.commission", "must be in [0, 1)"));
    }
    if !(b.slippage_bps.is_finite() && b.slippage_bps >= 0.0) {
        return Err(invalid("broker.slippage_bps", "must be non-negative"));
    }
    Ok(())
}
