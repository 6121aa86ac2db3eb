//! Order requests, order roles, and the order lifecycle status machine.

use super::ids::OrderId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the current market price (bar close or next open, per broker config).
    Market,
    /// Fill at limit price or better.
    Limit { limit_price: f64 },
    /// Triggers when price reaches the trigger level, then fills as market.
    Stop { trigger_price: f64 },
}

impl OrderType {
    /// Price level of a resting order; `None` for market orders.
    pub fn level(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit { limit_price } => Some(*limit_price),
            OrderType::Stop { trigger_price } => Some(*trigger_price),
        }
    }
}

/// Semantic purpose of an order. Carried from submission through every
/// notification so the controller never has to compare order objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderRole {
    Entry,
    ScaleIn,
    TakeProfit,
    StopLoss,
    /// Market order flattening a residual position (race guard, end of run).
    Close,
}

impl OrderRole {
    pub fn is_exit(self) -> bool {
        matches!(
            self,
            OrderRole::TakeProfit | OrderRole::StopLoss | OrderRole::Close
        )
    }
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderRole::Entry => "entry",
            OrderRole::ScaleIn => "scale_in",
            OrderRole::TakeProfit => "take_profit",
            OrderRole::StopLoss => "stop_loss",
            OrderRole::Close => "close",
        };
        f.write_str(s)
    }
}

/// What the controller asks the execution engine to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub role: OrderRole,
    /// Good-till timestamp; `None` means good until cancelled.
    pub valid_until: Option<NaiveDateTime>,
}

impl OrderRequest {
    pub fn market(side: OrderSide, quantity: f64, role: OrderRole) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            quantity,
            role,
            valid_until: None,
        }
    }

    pub fn limit(side: OrderSide, limit_price: f64, quantity: f64, role: OrderRole) -> Self {
        Self {
            side,
            order_type: OrderType::Limit { limit_price },
            quantity,
            role,
            valid_until: None,
        }
    }

    pub fn stop(side: OrderSide, trigger_price: f64, quantity: f64, role: OrderRole) -> Self {
        Self {
            side,
            order_type: OrderType::Stop { trigger_price },
            quantity,
            role,
            valid_until: None,
        }
    }

    pub fn valid_until(mut self, until: NaiveDateTime) -> Self {
        self.valid_until = Some(until);
        self
    }
}

/// Order lifecycle states.
///
/// `Submitted → Accepted → Filled | Canceled | Rejected | Margin | Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Filled,
    Canceled,
    Rejected,
    /// Not enough cash to cover the fill.
    Margin,
    /// Good-till time passed without a fill.
    Expired,
}

impl OrderStatus {
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::Accepted)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// A single order in the order book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub role: OrderRole,
    pub status: OrderStatus,
    /// Bar index at submission. Resting orders become eligible on the next bar.
    pub created_bar: usize,
    pub valid_until: Option<NaiveDateTime>,
}

impl Order {
    pub fn from_request(id: OrderId, request: OrderRequest, created_bar: usize) -> Self {
        Self {
            id,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            role: request.role,
            status: OrderStatus::Submitted,
            created_bar,
            valid_until: request.valid_until,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Audit trail entry for an order state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub bar_index: usize,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub reason: String,
}
