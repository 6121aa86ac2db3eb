//! Order book state machine: order storage, lifecycle transitions, and audit trail.
//!
//! The order book is the registry for every order the controller submits. It
//! manages:
//! - Order storage and lookup (active + historical), ordered by ID
//! - State transitions (Submitted → Accepted → Filled / Canceled / Rejected / Margin / Expired)
//! - Audit trail for every state transition
//!
//! The order book does NOT compute fill prices or move cash; that is the
//! broker's job. It tracks order state only.

use crate::domain::{Order, OrderAuditEntry, OrderId, OrderStatus};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from order book operations.
#[derive(Debug, Error, PartialEq)]
pub enum OrderBookError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} is not active (status: {1:?})")]
    OrderNotActive(OrderId, OrderStatus),

    #[error("invalid transition for order {0}: {1:?} → {2:?}")]
    InvalidTransition(OrderId, OrderStatus, OrderStatus),
}

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    audit_trail: Vec<OrderAuditEntry>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Public API ─────────────────────────────────────────────────────

    /// Insert a freshly created order. It must have status Submitted.
    pub fn insert(&mut self, order: Order, bar_index: usize) {
        debug_assert!(
            order.status == OrderStatus::Submitted,
            "inserted order must be Submitted"
        );
        let id = order.id;
        self.orders.insert(id, order);
        self.audit_trail.push(OrderAuditEntry {
            order_id: id,
            bar_index,
            from_status: None,
            to_status: OrderStatus::Submitted,
            reason: "submitted".into(),
        });
    }

    /// Submitted → Accepted.
    pub fn accept(&mut self, id: OrderId, bar_index: usize) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Accepted, bar_index, "accepted")
    }

    /// Mark an active order fully filled.
    pub fn record_fill(&mut self, id: OrderId, bar_index: usize) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Filled, bar_index, "filled")
    }

    /// Cancel an active order.
    ///
    /// Errors on unknown or settled orders; the broker turns that into an
    /// "already settled" outcome rather than surfacing it.
    pub fn cancel(
        &mut self,
        id: OrderId,
        bar_index: usize,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Canceled, bar_index, reason)
    }

    pub fn expire(&mut self, id: OrderId, bar_index: usize) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Expired, bar_index, "expired")
    }

    pub fn reject(
        &mut self,
        id: OrderId,
        bar_index: usize,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Rejected, bar_index, reason)
    }

    pub fn margin(&mut self, id: OrderId, bar_index: usize) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Margin, bar_index, "insufficient cash")
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// All active orders, in ID (submission) order.
    pub fn active_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.is_active()).collect()
    }

    pub fn has_active_orders(&self) -> bool {
        self.orders.values().any(|o| o.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.orders.values().filter(|o| o.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    // ── Internal helpers ───────────────────────────────────────────────

    fn transition(
        &mut self,
        id: OrderId,
        to: OrderStatus,
        bar_index: usize,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(OrderBookError::OrderNotFound(id))?;

        if !order.is_active() {
            return Err(OrderBookError::OrderNotActive(id, order.status));
        }
        if to == OrderStatus::Accepted && order.status != OrderStatus::Submitted {
            return Err(OrderBookError::InvalidTransition(id, order.status, to));
        }

        let from = order.status;
        order.status = to;
        self.audit_trail.push(OrderAuditEntry {
            order_id: id,
            bar_index,
            from_status: Some(from),
            to_status: to,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, OrderRole, OrderSide};

    fn limit_buy(id: u64, price: f64) -> Order {
        Order::from_request(
            OrderId(id),
            OrderRequest::limit(OrderSide::Buy, price, 100.0, OrderRole::ScaleIn),
            0,
        )
    }

    fn stop_sell(id: u64, price: f64) -> Order {
        Order::from_request(
            OrderId(id),
            OrderRequest::stop(OrderSide::Sell, price, 100.0, OrderRole::StopLoss),
            0,
        )
    }

    #[test]
    fn insert_and_get() {
        let mut book = OrderBook::new();
        book.insert(limit_buy(1, 0.96), 0);
        let order = book.get(OrderId(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);
        assert_eq!(book.len(), 1);
        assert_eq!(book.audit_trail().len(), 1);
    }

    #[test]
    fn accept_then_fill() {
        let mut book = OrderBook::new();
        book.insert(limit_buy(1, 0.96), 0);
        book.accept(OrderId(1), 0).unwrap();
        book.record_fill(OrderId(1), 3).unwrap();
        assert_eq!(book.get(OrderId(1)).unwrap().status, OrderStatus::Filled);
        assert!(!book.has_active_orders());

        let last = book.audit_trail().last().unwrap();
        assert_eq!(last.from_status, Some(OrderStatus::Accepted));
        assert_eq!(last.to_status, OrderStatus::Filled);
        assert_eq!(last.bar_index, 3);
    }

    #[test]
    fn accept_twice_is_invalid() {
        let mut book = OrderBook::new();
        book.insert(limit_buy(1, 0.96), 0);
        book.accept(OrderId(1), 0).unwrap();
        assert_eq!(
            book.accept(OrderId(1), 0),
            Err(OrderBookError::InvalidTransition(
                OrderId(1),
                OrderStatus::Accepted,
                OrderStatus::Accepted
            ))
        );
    }

    #[test]
    fn active_orders_returns_only_active() {
        let mut book = OrderBook::new();
        book.insert(limit_buy(1, 0.96), 0);
        book.insert(stop_sell(2, 0.91), 0);
        book.cancel(OrderId(1), 1, "test").unwrap();

        let active = book.active_orders();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, OrderId(2));
        assert_eq!(book.active_count(), 1);
    }

    #[test]
    fn cancel_filled_order_fails_without_mutation() {
        let mut book = OrderBook::new();
        book.insert(stop_sell(1, 0.91), 0);
        book.record_fill(OrderId(1), 2).unwrap();
        let trail_len = book.audit_trail().len();

        let err = book.cancel(OrderId(1), 3, "late").unwrap_err();
        assert_eq!(err, OrderBookError::OrderNotActive(OrderId(1), OrderStatus::Filled));
        assert_eq!(book.get(OrderId(1)).unwrap().status, OrderStatus::Filled);
        assert_eq!(book.audit_trail().len(), trail_len);
    }

    #[test]
    fn cancel_unknown_order_fails() {
        let mut book = OrderBook::new();
        assert_eq!(
            book.cancel(OrderId(99), 0, "nope"),
            Err(OrderBookError::OrderNotFound(OrderId(99)))
        );
    }

    #[test]
    fn expire_reject_and_margin_are_terminal() {
        let mut book = OrderBook::new();
        book.insert(limit_buy(1, 0.96), 0);
        book.insert(limit_buy(2, 0.95), 0);
        book.insert(limit_buy(3, 0.94), 0);
        book.expire(OrderId(1), 5).unwrap();
        book.reject(OrderId(2), 5, "bad size").unwrap();
        book.margin(OrderId(3), 5).unwrap();

        assert_eq!(book.get(OrderId(1)).unwrap().status, OrderStatus::Expired);
        assert_eq!(book.get(OrderId(2)).unwrap().status, OrderStatus::Rejected);
        assert_eq!(book.get(OrderId(3)).unwrap().status, OrderStatus::Margin);
        assert!(book.expire(OrderId(1), 6).is_err());
    }
}
