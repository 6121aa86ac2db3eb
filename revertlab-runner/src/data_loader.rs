//! Bar loading and data resolution for the runner.
//!
//! Implements the fallback policy:
//! 1. If a CSV path is configured and exists → parse it
//! 2. If not and `synthetic` is set → generate a seeded random walk (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! CSV rows are `timestamp, open, high, low, close, volume[, ...]`; extra
//! columns (Binance kline exports carry six more) are ignored. A header row
//! is detected and skipped. Timestamps may be epoch seconds, milliseconds or
//! microseconds, or ISO-8601 date-times.
//!
//! Synthetic data is a developer-only debug mode; results are tagged.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use revertlab_core::domain::Bar;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data file not found: {} (use --synthetic for synthetic data)", .0.display())]
    NotFound(PathBuf),

    #[error("no data file configured (set [data].path, pass --data, or use --synthetic)")]
    NoSource,

    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: row {row}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        row: u64,
        reason: String,
    },

    #[error("{}: bars out of order at {at}", path.display())]
    Unordered { path: PathBuf, at: NaiveDateTime },

    #[error("no bars in {0}")]
    Empty(String),
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// First calendar day kept (inclusive).
    pub start: Option<NaiveDate>,
    /// Last calendar day kept (inclusive).
    pub end: Option<NaiveDate>,
    /// Generate synthetic bars when no CSV is available.
    pub synthetic: bool,
}

/// Where the bars came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Csv(PathBuf),
    Synthetic,
}

/// Result of loading bars, including provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub bars: Vec<Bar>,
    pub source: DataSource,
    /// BLAKE3 over symbol and all OHLCV values.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Load bars for one symbol, with synthetic fallback.
pub fn load_bars(
    path: Option<&Path>,
    symbol: &str,
    timeframe_minutes: u32,
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    let (bars, source) = match path {
        Some(p) if p.exists() => (read_csv(p)?, DataSource::Csv(p.to_path_buf())),
        _ if opts.synthetic => {
            warn!(symbol, "generating synthetic data; results will be tagged as synthetic");
            let start = opts
                .start
                .or_else(|| NaiveDate::from_ymd_opt(2023, 1, 1))
                .unwrap_or(NaiveDate::MIN);
            let end = opts.end.unwrap_or(start + Duration::days(90));
            let bars = generate_synthetic_bars(symbol, start, end, timeframe_minutes);
            (bars, DataSource::Synthetic)
        }
        Some(p) => return Err(LoadError::NotFound(p.to_path_buf())),
        None => return Err(LoadError::NoSource),
    };

    let total = bars.len();
    let bars = filter_dates(bars, opts.start, opts.end);
    if bars.is_empty() {
        let window = match (opts.start, opts.end) {
            (None, None) => format!("{source:?}"),
            (start, end) => format!(
                "{source:?} between {} and {}",
                start.map(|d| d.to_string()).unwrap_or_else(|| "..".into()),
                end.map(|d| d.to_string()).unwrap_or_else(|| "..".into())
            ),
        };
        return Err(LoadError::Empty(window));
    }
    info!(symbol, kept = bars.len(), total, "bars loaded");

    let dataset_hash = compute_dataset_hash(symbol, &bars);
    Ok(LoadedData {
        bars,
        has_synthetic: source == DataSource::Synthetic,
        source,
        dataset_hash,
    })
}

/// Parse a bar CSV. Rows must be strictly increasing in time and sane.
pub fn read_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut bars: Vec<Bar> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let row = i as u64 + 1;
        let malformed = |reason: String| LoadError::Malformed {
            path: path.to_path_buf(),
            row,
            reason,
        };

        let first = record.get(0).unwrap_or_default();
        let Some(timestamp) = parse_timestamp(first) else {
            if row == 1 {
                continue; // header
            }
            return Err(malformed(format!("unparseable timestamp '{first}'")));
        };
        if record.len() < 6 {
            return Err(malformed(format!("expected 6 columns, found {}", record.len())));
        }

        let mut values = [0.0_f64; 5];
        for (slot, col) in values.iter_mut().zip(1..6) {
            let raw = record.get(col).unwrap_or_default();
            *slot = raw
                .parse()
                .map_err(|_| malformed(format!("column {col}: '{raw}' is not a number")))?;
        }
        let [open, high, low, close, volume] = values;
        let bar = Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        if !bar.is_sane() {
            return Err(malformed(format!("inconsistent OHLCV at {timestamp}")));
        }
        if bars.last().is_some_and(|prev| prev.timestamp >= timestamp) {
            return Err(LoadError::Unordered {
                path: path.to_path_buf(),
                at: timestamp,
            });
        }
        bars.push(bar);
    }
    Ok(bars)
}

/// Epoch seconds / milliseconds / microseconds (by magnitude) or ISO-8601.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(value) = raw.parse::<i64>() {
        let (scale, nanos_per_unit) = match value.unsigned_abs() {
            v if v >= 100_000_000_000_000 => (1_000_000, 1_000),
            v if v >= 100_000_000_000 => (1_000, 1_000_000),
            _ => (1, 0),
        };
        let secs = value.div_euclid(scale);
        let nanos = (value.rem_euclid(scale) * nanos_per_unit) as u32;
        return DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Keep bars whose calendar day falls in `[start, end]`.
pub fn filter_dates(bars: Vec<Bar>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| start.map_or(true, |s| b.date() >= s) && end.map_or(true, |e| b.date() <= e))
        .collect()
}

/// Deterministic BLAKE3 hash over all bar data.
fn compute_dataset_hash(symbol: &str, bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    for bar in bars {
        hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Synthetic intraday random walk starting at 1.0, one bar per
/// `timeframe_minutes` from `start` through the end of `end`.
///
/// Seeded from the symbol name, so the same inputs give the same bars.
pub fn generate_synthetic_bars(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    timeframe_minutes: u32,
) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let step = Duration::minutes(i64::from(timeframe_minutes.max(1)));
    let Some(mut current) = start.and_hms_opt(0, 0, 0) else {
        return Vec::new();
    };
    let mut bars = Vec::new();
    let mut price = 1.0_f64;

    while current.date() <= end {
        let ret: f64 = rng.gen_range(-0.015..0.015);
        let open = price;
        let close = (price * (1.0 + ret)).max(0.0001);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.006));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.006));
        let volume = rng.gen_range(10_000.0..500_000.0);

        bars.push(Bar {
            timestamp: current,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
        current += step;
    }
    bars
}
