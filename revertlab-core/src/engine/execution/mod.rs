//! Simulated broker: accepts order requests, fills them against bars, and
//! queues status notifications for the controller.
//!
//! Phase methods map to the event loop phases:
//! - `begin_bar`: expire stale orders, fill `next_bar_open` market orders
//! - `step_intrabar`: limit/stop fills in inferred path order
//! - `fill_at_close`: `same_bar_close` market orders
//! - `close_out`: end of data, fill remaining market orders at the last close
//!
//! Under `FillReporting::Sequential` each intrabar step fills at most one
//! order, so the controller reacts (and can cancel siblings) before the next
//! order is evaluated. Under `Batched` every order the bar reaches fills
//! before any notification is delivered.

pub mod cost_model;
pub mod path_policy;
pub mod trigger;

pub use cost_model::{ComputedFill, CostModel};
pub use path_policy::BarPath;
pub use trigger::{check_trigger, GapPolicy, Touch};

use crate::domain::{
    Bar, Fill, IdGen, Order, OrderAuditEntry, OrderEvent, OrderId, OrderRequest, OrderRole,
    OrderSide, OrderType, OrderUpdate, Position,
};
use crate::engine::gateway::{CancelOutcome, OrderGateway};
use crate::engine::order_book::OrderBook;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// When market orders fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketFill {
    /// At the close of the bar they were submitted on.
    #[default]
    SameBarClose,
    /// At the open of the following bar.
    NextBarOpen,
}

/// How intrabar fills are reported back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillReporting {
    #[default]
    Sequential,
    Batched,
}

/// Broker configuration (`[broker]` in the TOML config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub start_cash: f64,
    /// Fraction of notional charged per fill.
    pub commission: f64,
    pub slippage_bps: f64,
    pub market_fill: MarketFill,
    pub fill_reporting: FillReporting,
    pub gap_policy: GapPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            start_cash: 500.0,
            commission: 0.001,
            slippage_bps: 0.0,
            market_fill: MarketFill::default(),
            fill_reporting: FillReporting::default(),
            gap_policy: GapPolicy::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn frictionless() -> Self {
        Self {
            commission: 0.0,
            ..Self::default()
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.slippage_bps, self.commission)
    }
}

/// Single-symbol simulated broker.
pub struct SimBroker {
    config: ExecutionConfig,
    cost: CostModel,
    book: OrderBook,
    ids: IdGen,
    position: Position,
    cash: f64,
    bar_index: usize,
    bar: Option<Bar>,
    path: Option<BarPath>,
    /// Path position of the last intrabar fill on the current bar.
    intrabar_cursor: f64,
    intrabar_done: bool,
    outbox: VecDeque<OrderEvent>,
    fills: Vec<Fill>,
    went_flat: bool,
}

impl SimBroker {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            cost: config.cost_model(),
            cash: config.start_cash,
            config,
            book: OrderBook::new(),
            ids: IdGen::default(),
            position: Position::default(),
            bar_index: 0,
            bar: None,
            path: None,
            intrabar_cursor: 0.0,
            intrabar_done: true,
            outbox: VecDeque::new(),
            fills: Vec::new(),
            went_flat: false,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.book.get(id)
    }

    pub fn active_orders(&self) -> Vec<&Order> {
        self.book.active_orders()
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        self.book.audit_trail()
    }

    /// Cash plus position marked at the current bar's close.
    pub fn equity(&self) -> f64 {
        let mark = self
            .bar
            .as_ref()
            .map(|b| b.close)
            .unwrap_or(self.position.avg_price);
        self.cash + self.position.market_value(mark)
    }

    pub fn next_event(&mut self) -> Option<OrderEvent> {
        self.outbox.pop_front()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// True once after a fill brought the position to zero, provided it is
    /// still zero now. Later fills that reopen the position clear the flag.
    pub fn take_flat_confirmation(&mut self) -> bool {
        let confirmed = self.went_flat && self.position.is_flat();
        self.went_flat = false;
        confirmed
    }

    // ── Bar phases ─────────────────────────────────────────────────────

    /// Phase 1: start of bar. Expires orders past their good-till time and
    /// fills market orders queued for this open.
    pub fn begin_bar(&mut self, bar_index: usize, bar: &Bar) {
        self.bar_index = bar_index;
        self.bar = Some(bar.clone());
        self.path = Some(BarPath::infer(bar));
        self.intrabar_cursor = 0.0;
        self.intrabar_done = false;

        let expired: Vec<(OrderId, OrderRole)> = self
            .book
            .active_orders()
            .iter()
            .filter(|o| o.valid_until.is_some_and(|until| bar.timestamp > until))
            .map(|o| (o.id, o.role))
            .collect();
        for (id, role) in expired {
            if self.book.expire(id, bar_index).is_ok() {
                debug!(order = %id, %role, "order expired");
                self.push(id, role, OrderUpdate::Expired);
            }
        }

        if self.config.market_fill == MarketFill::NextBarOpen {
            for id in self.market_orders(|o| o.created_bar < bar_index) {
                self.execute(id, bar.open);
            }
        }
    }

    /// Phase 2: intrabar. Returns `false` once nothing more fills on this bar.
    ///
    /// Only resting orders created on earlier bars are eligible. Orders are
    /// taken in path order; at the same path point, position-reducing orders
    /// go first.
    pub fn step_intrabar(&mut self) -> bool {
        if self.intrabar_done {
            return false;
        }
        let Some(path) = self.path else {
            return false;
        };

        let mut candidates: Vec<(Touch, bool, OrderId)> = self
            .book
            .active_orders()
            .iter()
            .filter(|o| o.created_bar < self.bar_index)
            .filter_map(|o| {
                check_trigger(o, &path, self.config.gap_policy)
                    .map(|touch| (touch, self.is_reducing(o.side), o.id))
            })
            .filter(|(touch, _, _)| touch.position >= self.intrabar_cursor)
            .collect();
        candidates.sort_by(|a, b| {
            a.0.position
                .total_cmp(&b.0.position)
                .then(b.1.cmp(&a.1))
                .then(a.2.cmp(&b.2))
        });

        match self.config.fill_reporting {
            FillReporting::Sequential => match candidates.first() {
                Some(&(touch, _, id)) => {
                    self.intrabar_cursor = touch.position;
                    self.execute(id, touch.raw_price);
                    true
                }
                None => {
                    self.intrabar_done = true;
                    false
                }
            },
            FillReporting::Batched => {
                self.intrabar_done = true;
                for &(touch, _, id) in &candidates {
                    self.execute(id, touch.raw_price);
                }
                !candidates.is_empty()
            }
        }
    }

    /// Phase 4: fill `same_bar_close` market orders at the close.
    /// Returns `false` when there is nothing left to fill.
    pub fn fill_at_close(&mut self) -> bool {
        if self.config.market_fill != MarketFill::SameBarClose {
            return false;
        }
        let Some(close) = self.bar.as_ref().map(|b| b.close) else {
            return false;
        };
        let ids = self.market_orders(|_| true);
        if ids.is_empty() {
            return false;
        }
        match self.config.fill_reporting {
            FillReporting::Sequential => self.execute(ids[0], close),
            FillReporting::Batched => ids.into_iter().for_each(|id| self.execute(id, close)),
        }
        true
    }

    /// End of data: fill outstanding market orders at the last close and
    /// cancel whatever else is still resting.
    pub fn close_out(&mut self) {
        let Some(close) = self.bar.as_ref().map(|b| b.close) else {
            return;
        };
        for id in self.market_orders(|_| true) {
            self.execute(id, close);
        }
        let leftover: Vec<(OrderId, OrderRole)> = self
            .book
            .active_orders()
            .iter()
            .map(|o| (o.id, o.role))
            .collect();
        for (id, role) in leftover {
            if self.book.cancel(id, self.bar_index, "end of data").is_ok() {
                self.push(id, role, OrderUpdate::Canceled);
            }
        }
    }

    // ── Internal helpers ───────────────────────────────────────────────

    fn market_orders(&self, keep: impl Fn(&Order) -> bool) -> Vec<OrderId> {
        self.book
            .active_orders()
            .into_iter()
            .filter(|o| o.order_type == OrderType::Market && keep(o))
            .map(|o| o.id)
            .collect()
    }

    fn is_reducing(&self, side: OrderSide) -> bool {
        !self.position.is_flat() && self.position.quantity.signum() != side.sign()
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.bar.as_ref().map(|b| b.timestamp).unwrap_or_default()
    }

    fn push(&mut self, order_id: OrderId, role: OrderRole, update: OrderUpdate) {
        self.outbox.push_back(OrderEvent {
            order_id,
            role,
            bar_index: self.bar_index,
            timestamp: self.timestamp(),
            update,
        });
    }

    /// Fill an active order at `raw_price`, or mark it `Margin` if a buy
    /// cannot be paid for.
    fn execute(&mut self, id: OrderId, raw_price: f64) {
        let Some(order) = self.book.get(id).filter(|o| o.is_active()) else {
            return;
        };
        let (side, quantity, role) = (order.side, order.quantity, order.role);
        let computed = self.cost.compute_fill(raw_price, side, quantity);

        if side == OrderSide::Buy && !self.is_reducing(side) {
            let required = computed.price * quantity + computed.commission;
            if required > self.cash + 1e-9 {
                warn!(order = %id, %role, required, cash = self.cash, "insufficient cash");
                if self.book.margin(id, self.bar_index).is_ok() {
                    self.push(id, role, OrderUpdate::Margin);
                }
                return;
            }
        }

        let pnl = self.position.apply(side, quantity, computed.price);
        self.cash -= side.sign() * computed.price * quantity + computed.commission;
        self.went_flat = self.position.is_flat();
        let _ = self.book.record_fill(id, self.bar_index);

        let fill = Fill {
            order_id: id,
            role,
            bar_index: self.bar_index,
            timestamp: self.timestamp(),
            side,
            price: computed.price,
            quantity,
            commission: computed.commission,
            slippage: computed.slippage,
            pnl,
        };
        debug!(
            order = %id,
            %role,
            ?side,
            price = fill.price,
            quantity,
            position = self.position.quantity,
            "fill"
        );
        self.fills.push(fill.clone());
        self.push(id, role, OrderUpdate::Filled(fill));
    }
}

impl OrderGateway for SimBroker {
    fn submit(&mut self, request: OrderRequest) -> OrderId {
        let id = self.ids.next_order_id();
        let problem = if !(request.quantity.is_finite() && request.quantity > 0.0) {
            Some("non-positive quantity")
        } else if request
            .order_type
            .level()
            .is_some_and(|p| !(p.is_finite() && p > 0.0))
        {
            Some("invalid price")
        } else {
            None
        };

        let order = Order::from_request(id, request, self.bar_index);
        let role = order.role;
        self.book.insert(order, self.bar_index);
        self.push(id, role, OrderUpdate::Submitted);

        match problem {
            Some(reason) => {
                let _ = self.book.reject(id, self.bar_index, reason);
                self.push(
                    id,
                    role,
                    OrderUpdate::Rejected {
                        reason: reason.to_string(),
                    },
                );
            }
            None => {
                let _ = self.book.accept(id, self.bar_index);
                self.push(id, role, OrderUpdate::Accepted);
            }
        }
        id
    }

    fn cancel(&mut self, id: OrderId) -> CancelOutcome {
        match self.book.cancel(id, self.bar_index, "canceled by strategy") {
            Ok(()) => {
                let role = self.book.get(id).map(|o| o.role);
                if let Some(role) = role {
                    self.push(id, role, OrderUpdate::Canceled);
                }
                CancelOutcome::Canceled
            }
            Err(err) => {
                debug!(order = %id, %err, "cancel ignored");
                CancelOutcome::AlreadySettled
            }
        }
    }

    fn position(&self) -> Position {
        self.position
    }
}
