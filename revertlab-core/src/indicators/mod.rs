//! Entry-timing oscillators.
//!
//! Oscillators are streaming: the event loop feeds one bar at a time and the
//! oscillator never sees a bar beyond the current one. Each implementation
//! also exposes a batch `compute` built on the same update path, used by the
//! look-ahead tests.

pub mod mfi;

pub use mfi::MoneyFlowIndex;

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

/// A bounded [0, 100] score computed from a trailing window of bars.
pub trait Oscillator: Send + Sync {
    fn name(&self) -> &str;

    /// Number of bars needed before the first score (first score at index `lookback`).
    fn lookback(&self) -> usize;

    /// Feed the next bar. Returns `None` while warming up.
    fn update(&mut self, bar: &Bar) -> Option<f64>;

    /// Latest score, `None` during warm-up.
    fn value(&self) -> Option<f64>;

    fn reset(&mut self);
}

/// Which oscillator to build. Chosen explicitly in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OscillatorKind {
    #[default]
    #[serde(rename = "mfi")]
    MoneyFlowIndex,
}

/// Build the configured oscillator.
pub fn build_oscillator(kind: OscillatorKind, period: usize) -> Box<dyn Oscillator> {
    match kind {
        OscillatorKind::MoneyFlowIndex => Box::new(MoneyFlowIndex::new(period)),
    }
}

/// Create synthetic bars from (typical-ish price, volume) pairs for testing.
///
/// high = low = close = price, so the typical price equals `price` exactly.
#[cfg(test)]
pub fn make_bars(prices: &[(f64, f64)]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    prices
        .iter()
        .enumerate()
        .map(|(i, &(price, volume))| Bar {
            timestamp: base + chrono::Duration::minutes(30 * i as i64),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_mfi() {
        let osc = build_oscillator(OscillatorKind::MoneyFlowIndex, 10);
        assert_eq!(osc.name(), "mfi_10");
        assert_eq!(osc.lookback(), 10);
        assert!(osc.value().is_none());
    }

    #[test]
    fn kind_deserializes_from_short_name() {
        let kind: OscillatorKind = serde_json::from_str("\"mfi\"").unwrap();
        assert_eq!(kind, OscillatorKind::MoneyFlowIndex);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"mfi\"");
    }
}
