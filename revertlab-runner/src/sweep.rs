//! Parameter sweep over the entry offset, initial take-profit, and scale-in
//! offset grids.
//!
//! Each grid point is an independent controller and broker over the same
//! bars, so points run in parallel with rayon.

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::info;

use revertlab_core::domain::Bar;
use revertlab_core::engine::ExecutionConfig;
use revertlab_core::strategy::StrategyParams;

use crate::config::{validate_strategy, BacktestConfig, SweepConfig};
use crate::data_loader::{load_bars, LoadOptions};
use crate::runner::{run_backtest_from_data, BacktestResult};

/// Values to try for each swept parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub first_entry_offset: Vec<f64>,
    pub tp_initial: Vec<f64>,
    pub scale_in_offset: Vec<f64>,
}

impl ParamGrid {
    pub fn from_config(sweep: &SweepConfig) -> Self {
        Self {
            first_entry_offset: sweep.first_entry_offset.clone(),
            tp_initial: sweep.tp_initial.clone(),
            scale_in_offset: sweep.scale_in_offset.clone(),
        }
    }

    /// Number of combinations before validity filtering.
    pub fn size(&self) -> usize {
        self.first_entry_offset.len() * self.tp_initial.len() * self.scale_in_offset.len()
    }

    /// Expands the grid over `base`, in nested order (entry offset outermost).
    ///
    /// Combinations that fail parameter validation (e.g. a scale-in level at
    /// or below the stop) are skipped. Per-bar logging is forced off.
    pub fn generate(&self, base: &StrategyParams) -> Vec<StrategyParams> {
        let mut out = Vec::with_capacity(self.size());
        for &first_entry_offset in &self.first_entry_offset {
            for &tp_initial in &self.tp_initial {
                for &scale_in_offset in &self.scale_in_offset {
                    let params = StrategyParams {
                        first_entry_offset,
                        tp_initial,
                        scale_in_offset,
                        log_each_bar: false,
                        ..base.clone()
                    };
                    if validate_strategy(&params).is_ok() {
                        out.push(params);
                    }
                }
            }
        }
        out
    }
}

/// Results of a sweep, in grid order.
#[derive(Debug, Clone)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
}

impl SweepResults {
    fn new(results: Vec<BacktestResult>) -> Self {
        Self { results }
    }

    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Highest final portfolio value; ties go to the earliest grid point.
    pub fn best(&self) -> Option<&BacktestResult> {
        self.results.iter().fold(None, |best, r| match best {
            Some(b) if b.final_value() >= r.final_value() => Some(b),
            _ => Some(r),
        })
    }

    /// Descending by final value, stable for ties.
    pub fn sorted_by_final_value(&self) -> Vec<&BacktestResult> {
        let mut sorted: Vec<&BacktestResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| b.final_value().total_cmp(&a.final_value()));
        sorted
    }

    pub fn top_n(&self, n: usize) -> Vec<&BacktestResult> {
        self.sorted_by_final_value().into_iter().take(n).collect()
    }
}

/// Run every grid point over pre-loaded bars.
#[allow(clippy::too_many_arguments)]
pub fn sweep(
    grid: &ParamGrid,
    base: &StrategyParams,
    broker: &ExecutionConfig,
    bars: &[Bar],
    symbol: &str,
    dataset_hash: &str,
    has_synthetic: bool,
    parallel: bool,
) -> Result<SweepResults> {
    let points = grid.generate(base);
    info!(
        points = points.len(),
        skipped = grid.size() - points.len(),
        parallel,
        "starting parameter sweep"
    );

    let run = |params: &StrategyParams| {
        run_backtest_from_data(params, broker, bars, symbol, dataset_hash, has_synthetic)
    };
    let results = if parallel {
        points.par_iter().map(run).collect::<Result<Vec<_>, _>>()
    } else {
        points.iter().map(run).collect::<Result<Vec<_>, _>>()
    }
    .context("sweep run failed")?;

    Ok(SweepResults::new(results))
}

/// Load bars per the config and sweep its grid.
///
/// With `data.train_end` set, only bars up to that date are used.
pub fn optimize(config: &BacktestConfig, opts: &LoadOptions) -> Result<SweepResults> {
    config.validate().context("invalid config")?;
    let end = match (opts.end.or(config.data.end), config.data.train_end) {
        (Some(end), Some(train_end)) => Some(end.min(train_end)),
        (end, train_end) => end.or(train_end),
    };
    let opts = LoadOptions {
        start: opts.start.or(config.data.start),
        end,
        synthetic: opts.synthetic,
    };
    let loaded = load_bars(
        config.data.path.as_deref(),
        &config.data.symbol,
        config.data.timeframe_minutes,
        &opts,
    )
    .context("failed to load bars for sweep")?;

    sweep(
        &ParamGrid::from_config(&config.sweep),
        &config.strategy,
        &config.broker,
        &loaded.bars,
        &config.data.symbol,
        &loaded.dataset_hash,
        loaded.has_synthetic,
        config.sweep.parallel,
    )
}
