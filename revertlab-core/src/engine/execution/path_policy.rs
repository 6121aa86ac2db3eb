//! Path policy: infer the intrabar price path from OHLC.
//!
//! Heuristic: if |open - high| <= |open - low|, the price went to the high
//! first (path: Open → High → Low → Close). Otherwise Open → Low → High → Close.
//!
//! Positions along the path are expressed as `segment + fraction`, with
//! segment 1 = open → first extreme, 2 = first → second extreme,
//! 3 = second extreme → close. Position 0 is the open itself (gap fills).

use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarPath {
    points: [f64; 4],
}

impl BarPath {
    pub fn infer(bar: &Bar) -> Self {
        let high_first = (bar.open - bar.high).abs() <= (bar.open - bar.low).abs();
        let points = if high_first {
            [bar.open, bar.high, bar.low, bar.close]
        } else {
            [bar.open, bar.low, bar.high, bar.close]
        };
        Self { points }
    }

    pub fn open(&self) -> f64 {
        self.points[0]
    }

    pub fn is_high_first(&self) -> bool {
        self.points[1] >= self.points[2]
    }

    /// First position where price trades at or below `level` on a falling segment.
    pub fn first_down_touch(&self, level: f64) -> Option<f64> {
        self.first_touch(level, |from, to| from > level && to <= level)
    }

    /// First position where price trades at or above `level` on a rising segment.
    pub fn first_up_touch(&self, level: f64) -> Option<f64> {
        self.first_touch(level, |from, to| from < level && to >= level)
    }

    fn first_touch(&self, level: f64, crosses: impl Fn(f64, f64) -> bool) -> Option<f64> {
        self.points.windows(2).enumerate().find_map(|(seg, w)| {
            let (from, to) = (w[0], w[1]);
            if !crosses(from, to) {
                return None;
            }
            let frac = (from - level) / (from - to);
            Some((seg + 1) as f64 + frac.clamp(0.0, 1.0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn open_near_high_goes_up_first() {
        let path = BarPath::infer(&bar(0.99, 0.995, 0.955, 0.97));
        assert!(path.is_high_first());
        // falling segment is high → low, i.e. segment 2
        let pos = path.first_down_touch(0.96).unwrap();
        assert!(pos > 2.0 && pos < 3.0, "pos = {pos}");
    }

    #[test]
    fn open_near_low_goes_down_first() {
        let path = BarPath::infer(&bar(1.00, 1.05, 0.99, 1.02));
        assert!(!path.is_high_first());
        let down = path.first_down_touch(0.995).unwrap();
        let up = path.first_up_touch(1.015).unwrap();
        assert!(down < up);
        assert!(down < 2.0);
    }

    #[test]
    fn untouched_level_returns_none() {
        let path = BarPath::infer(&bar(1.00, 1.01, 0.99, 1.00));
        assert_eq!(path.first_up_touch(1.015), None);
        assert_eq!(path.first_down_touch(0.96), None);
    }

    #[test]
    fn touch_on_close_leg() {
        // O → H → L → C: 1.00 → 1.01 → 0.95 → 0.99; 0.98 from below is only
        // reached on the way back up to the close.
        let path = BarPath::infer(&bar(1.00, 1.01, 0.95, 0.99));
        let pos = path.first_up_touch(0.98).unwrap();
        assert!(pos > 3.0 && pos <= 4.0, "pos = {pos}");
    }
}
