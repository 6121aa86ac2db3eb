//! Run result types.

use crate::domain::{Fill, OrderAuditEntry, Position, TradeRecord};
use crate::strategy::JournalEntry;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Mark-to-market snapshot at a bar close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub cash: f64,
    pub position: f64,
}

/// Result of a complete backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub start_cash: f64,
    /// Equity after end-of-data close-out.
    pub final_equity: f64,
    pub equity_curve: Vec<EquityPoint>,
    /// All fills generated during the run, in execution order.
    pub fills: Vec<Fill>,
    /// Completed round-trip trades.
    pub trades: Vec<TradeRecord>,
    /// Controller lifecycle journal (entries, scale-ins, exits, races).
    pub journal: Vec<JournalEntry>,
    pub audit_trail: Vec<OrderAuditEntry>,
    /// Calendar day of each entry order submitted.
    pub signal_days: Vec<NaiveDate>,
    pub final_position: Position,
    pub bar_count: usize,
}

impl RunResult {
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }

    pub fn net_pnl(&self) -> f64 {
        self.final_equity - self.start_cash
    }

    pub fn total_commission(&self) -> f64 {
        self.fills.iter().map(|f| f.commission).sum()
    }
}
