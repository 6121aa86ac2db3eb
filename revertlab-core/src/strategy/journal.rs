//! Trade-lifecycle journal: one entry per controller decision worth reporting.

use crate::domain::OrderRole;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// Entry order submitted on an oscillator signal.
    Signal,
    Entry,
    ScaleIn,
    TakeProfit,
    StopLoss,
    Close,
    /// Scale-in fill that landed after the exit; flattened, not a new trade.
    SpuriousScaleIn,
    EntryCanceled,
    /// A protective or scale-in order died without filling and was not replaced.
    OrderLost(OrderRole),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub kind: JournalKind,
    pub price: f64,
    pub quantity: f64,
    /// Gross realized P&L on closing fills.
    pub pnl: Option<f64>,
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            JournalKind::Signal => "SIGNAL",
            JournalKind::Entry => "ENTRY",
            JournalKind::ScaleIn => "SCALE-IN",
            JournalKind::TakeProfit => "TAKE-PROFIT",
            JournalKind::StopLoss => "STOP-LOSS",
            JournalKind::Close => "CLOSE",
            JournalKind::SpuriousScaleIn => "SPURIOUS SCALE-IN",
            JournalKind::EntryCanceled => "ENTRY CANCELED",
            JournalKind::OrderLost(_) => "ORDER LOST",
        };
        write!(
            f,
            "{} bar {} {label} price={:.5} qty={}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.bar_index,
            self.price,
            self.quantity
        )?;
        if let JournalKind::OrderLost(role) = self.kind {
            write!(f, " role={role}")?;
        }
        if let Some(pnl) = self.pnl {
            write!(f, " pnl={pnl:.4}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn count(&self, kind: JournalKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn into_entries(self) -> Vec<JournalEntry> {
        self.entries
    }
}
