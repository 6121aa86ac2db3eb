use crate::domain::order::OrderSide;
use serde::{Deserialize, Serialize};

/// Quantities below this are treated as zero.
pub const QTY_EPSILON: f64 = 1e-9;

/// Net position in the single traded symbol.
///
/// Quantity is signed (long > 0). The strategy only ever goes long, but the
/// execution engine tracks sign so an over-sized close shows up as a short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: f64,
    pub avg_price: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < QTY_EPSILON
    }

    pub fn is_long(&self) -> bool {
        self.quantity >= QTY_EPSILON
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.avg_price)
    }

    /// Apply a fill. Returns the gross realized P&L if the fill reduced the
    /// position, `None` if it only opened or added to it.
    pub fn apply(&mut self, side: OrderSide, quantity: f64, price: f64) -> Option<f64> {
        let signed = side.sign() * quantity;
        if self.is_flat() || self.quantity.signum() == signed.signum() {
            let new_qty = self.quantity + signed;
            self.avg_price = if self.is_flat() {
                price
            } else {
                (self.avg_price * self.quantity.abs() + price * quantity) / new_qty.abs()
            };
            self.quantity = new_qty;
            return None;
        }

        let closed = quantity.min(self.quantity.abs());
        let pnl = closed * (price - self.avg_price) * self.quantity.signum();
        let new_qty = self.quantity + signed;
        if new_qty.abs() < QTY_EPSILON {
            *self = Position::default();
        } else if new_qty.signum() != self.quantity.signum() {
            // flipped through zero
            self.quantity = new_qty;
            self.avg_price = price;
        } else {
            self.quantity = new_qty;
        }
        Some(pnl)
    }
}
