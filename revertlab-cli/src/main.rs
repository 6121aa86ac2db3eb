//! RevertLab CLI: run and optimize commands.
//!
//! Commands:
//! - `run`: execute a single backtest from a TOML config
//! - `optimize`: sweep the config's parameter grid and report the best result

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use revertlab_runner::runner::run_single_backtest;
use revertlab_runner::sweep::optimize;
use revertlab_runner::{save_artifacts, BacktestConfig, BacktestResult, LoadOptions, TradeStats};

#[derive(Parser)]
#[command(
    name = "revertlab",
    about = "RevertLab CLI: money-flow mean-reversion backtester"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `run` and `optimize`.
#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML config file. Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bar CSV (timestamp, open, high, low, close, volume). Overrides [data].path.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Start date (YYYY-MM-DD). Overrides [data].start.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Overrides [data].end.
    #[arg(long)]
    end: Option<String>,

    /// Use seeded synthetic bars when no data file is available.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single backtest.
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Write summary.json, trades.csv, equity.csv, and trade_log.txt here.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Sweep the [sweep] grid and report the configuration with the highest final value.
    Optimize {
        #[command(flatten)]
        common: CommonArgs,

        /// How many ranked results to print.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { common, output_dir } => {
            init_tracing(common.verbose);
            run_cmd(&common, output_dir)
        }
        Commands::Optimize { common, top } => {
            init_tracing(common.verbose);
            optimize_cmd(&common, top)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_target(false)
        .init();
}

fn load_config(common: &CommonArgs) -> Result<(BacktestConfig, LoadOptions)> {
    let mut config = match &common.config {
        Some(path) => BacktestConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BacktestConfig::default(),
    };
    if let Some(data) = &common.data {
        config = config.with_data_path(data);
    }
    let opts = LoadOptions {
        start: parse_date(common.start.as_deref(), "--start")?,
        end: parse_date(common.end.as_deref(), "--end")?,
        synthetic: common.synthetic,
    };
    Ok((config, opts))
}

fn parse_date(raw: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("{flag}: expected YYYY-MM-DD, got '{s}'"))
    })
    .transpose()
}

fn run_cmd(common: &CommonArgs, output_dir: Option<PathBuf>) -> Result<()> {
    let (config, opts) = load_config(common)?;
    let result = run_single_backtest(&config, &opts)?;

    print_summary(&result);

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&result, &dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn optimize_cmd(common: &CommonArgs, top: usize) -> Result<()> {
    let (config, opts) = load_config(common)?;
    let results = optimize(&config, &opts)?;
    let best = results
        .best()
        .context("no valid parameter combinations in the sweep grid")?;

    println!();
    println!("=== Sweep ({} runs) ===", results.len());
    if let Some(train_end) = config.data.train_end {
        println!("In-sample through {train_end}");
    }
    println!(
        "{:<4} {:>8} {:>8} {:>8} {:>12} {:>7} {:>8}",
        "#", "entry", "tp", "scale", "final", "trades", "win%"
    );
    println!("{}", "-".repeat(60));
    for (rank, r) in results.top_n(top).iter().enumerate() {
        println!(
            "{:<4} {:>8.3} {:>8.3} {:>8.3} {:>12.4} {:>7} {:>7.1}%",
            rank + 1,
            r.params.first_entry_offset,
            r.params.tp_initial,
            r.params.scale_in_offset,
            r.stats.final_value,
            r.stats.closed_trades,
            r.stats.win_rate * 100.0
        );
    }

    println!();
    println!("Best parameters:");
    println!("{}", serde_json::to_string_pretty(&best.params)?);
    print_summary(best);
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let s = &result.stats;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:           {}", result.symbol);
    println!("Period:           {} to {}", result.start, result.end);
    println!("Bars:             {}", result.bar_count);
    println!("Signals:          {}", result.signal_count);
    println!("Run ID:           {}", result.short_id());
    println!();
    println!("Starting Value:   {:.4}", s.start_value);
    println!("Final Value:      {:.4}", s.final_value);
    println!("Total Return:     {:.2}%", s.total_return() * 100.0);
    println!();
    println!("--- Trades ---");
    println!("Closed Trades:    {}", s.closed_trades);
    println!("Won / Lost:       {} / {}", s.wins, s.losses);
    println!("Win P&L:          {:.4}", s.win_pnl);
    println!("Loss P&L:         {:.4}", s.loss_pnl);
    println!("Net P&L:          {:.4}", s.net_pnl);
    println!("Commission:       {:.4}", s.total_commission);
    println!("Win Rate:         {:.1}%", s.win_rate * 100.0);
    println!("Profit Factor:    {:.2}", s.profit_factor);
    println!("{}", drawdown_line(s));
    println!(
        "Exits TP/SL/Close: {} / {} / {}",
        s.take_profit_exits, s.stop_loss_exits, s.forced_exits
    );
    println!("Scaled Trades:    {}", s.scaled_trades);
    println!("Avg Bars Held:    {:.1}", s.avg_bars_held);
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

/// Drawdown is stored as a negative fraction; reported as a magnitude.
fn drawdown_line(s: &TradeStats) -> String {
    format!(
        "Max Drawdown:     {:.2}% ({:.4})",
        s.max_drawdown.abs() * 100.0,
        s.max_drawdown_abs
    )
}
