use crate::domain::ids::OrderId;
use crate::domain::order::{OrderRole, OrderSide};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fill record produced by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub role: OrderRole,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub side: OrderSide,
    /// Final price after slippage.
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    /// Cash amount of slippage applied.
    pub slippage: f64,
    /// Gross realized P&L, present only on position-reducing fills.
    pub pnl: Option<f64>,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}
