use crate::domain::order::OrderRole;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A completed round-trip trade, flat to flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    pub exit_bar: usize,
    pub exit_time: NaiveDateTime,
    pub first_entry_price: f64,
    /// Quantity-weighted average of all opening fills.
    pub avg_entry_price: f64,
    /// Quantity-weighted average of all closing fills.
    pub avg_exit_price: f64,
    pub max_quantity: f64,
    pub scaled_in: bool,
    /// Role of the fill that brought the position back to flat.
    pub exit_reason: OrderRole,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    pub bars_held: usize,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.net_pnl < 0.0
    }
}
