//! The seam between the lifecycle controller and whatever executes its orders.

use crate::domain::{OrderId, OrderRequest, Position};

/// Result of a cancel request. Cancelling is idempotent and never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The order was live and is now canceled; a `Canceled` notification follows.
    Canceled,
    /// Unknown, filled, or already dead. Nothing changed.
    AlreadySettled,
}

/// Order-submission interface the controller drives.
///
/// Notifications flow back separately (the event loop drains them from the
/// broker and hands them to the controller), so implementations only need to
/// accept requests and report the current position.
pub trait OrderGateway {
    fn submit(&mut self, request: OrderRequest) -> OrderId;

    fn cancel(&mut self, id: OrderId) -> CancelOutcome;

    /// Authoritative current position, including fills not yet reported.
    fn position(&self) -> Position;
}
