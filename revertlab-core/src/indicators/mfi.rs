//! Money Flow Index (MFI).
//!
//! Typical price tp = (H + L + C) / 3, raw flow = tp * volume.
//! A bar's flow is positive if tp rose versus the previous bar, negative if it
//! fell, and counts toward neither sum if tp is unchanged.
//! MFI = 100 - 100 / (1 + positive_sum / negative_sum) over the last `period` flows.
//! Lookback: period (first value once period + 1 bars have been seen).
//! Edge case: negative_sum == 0 → MFI = 100.

use super::Oscillator;
use crate::domain::Bar;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct MoneyFlowIndex {
    period: usize,
    name: String,
    prev_tp: Option<f64>,
    /// (positive, negative) flow per bar, newest at the back.
    window: VecDeque<(f64, f64)>,
    current: Option<f64>,
}

impl MoneyFlowIndex {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "MFI period must be >= 1");
        Self {
            period,
            name: format!("mfi_{period}"),
            prev_tp: None,
            window: VecDeque::with_capacity(period + 1),
            current: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Batch computation over a full series, one entry per bar.
    ///
    /// Runs the same update path as streaming, so a prefix of the series
    /// always yields a prefix of the output.
    pub fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let mut fresh = Self::new(self.period);
        bars.iter().map(|bar| fresh.update(bar)).collect()
    }
}

impl Oscillator for MoneyFlowIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let tp = bar.typical_price();
        let Some(prev) = self.prev_tp.replace(tp) else {
            return None;
        };

        let raw = tp * bar.volume;
        let flow = if tp > prev {
            (raw, 0.0)
        } else if tp < prev {
            (0.0, raw)
        } else {
            (0.0, 0.0)
        };
        self.window.push_back(flow);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        if self.window.len() < self.period {
            return None;
        }

        // Re-sum the window each bar; a running sum drifts under float error.
        let (pos, neg) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(p, n), (fp, fn_)| (p + fp, n + fn_));
        let score = if neg == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + pos / neg)
        };
        self.current = Some(score);
        self.current
    }

    fn value(&self) -> Option<f64> {
        self.current
    }

    fn reset(&mut self) {
        self.prev_tp = None;
        self.window.clear();
        self.current = None;
    }
}
