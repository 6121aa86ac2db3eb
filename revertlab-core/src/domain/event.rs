//! Notifications from the execution engine back to the controller.

use super::fill::Fill;
use super::ids::OrderId;
use super::order::{OrderRole, OrderStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A status transition for one order, tagged with the role it was submitted under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub role: OrderRole,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub update: OrderUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderUpdate {
    Submitted,
    Accepted,
    Filled(Fill),
    Canceled,
    Rejected { reason: String },
    Margin,
    Expired,
}

impl OrderUpdate {
    pub fn status(&self) -> OrderStatus {
        match self {
            OrderUpdate::Submitted => OrderStatus::Submitted,
            OrderUpdate::Accepted => OrderStatus::Accepted,
            OrderUpdate::Filled(_) => OrderStatus::Filled,
            OrderUpdate::Canceled => OrderStatus::Canceled,
            OrderUpdate::Rejected { .. } => OrderStatus::Rejected,
            OrderUpdate::Margin => OrderStatus::Margin,
            OrderUpdate::Expired => OrderStatus::Expired,
        }
    }

    /// Terminal without a fill: the order is gone and nothing traded.
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            OrderUpdate::Canceled
                | OrderUpdate::Rejected { .. }
                | OrderUpdate::Margin
                | OrderUpdate::Expired
        )
    }
}
