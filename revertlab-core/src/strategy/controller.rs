//! Trade lifecycle controller.
//!
//! Owns the strategy state machine and drives an `OrderGateway`:
//!
//! ```text
//! Idle ──signal──▶ EntryPending ──entry fill──▶ SingleLeg ──scale-in fill──▶ ScaledLeg
//!   ▲                   │                           │                           │
//!   │              cancel/reject               TP/SL fill                   TP/SL fill
//!   │                   ▼                           ▼                           ▼
//!   └───────────────── Idle ◀──position flat── ExitPending ◀────────────────────┘
//! ```
//!
//! Notifications are correlated through the role tag and the role → handle
//! map. Handles that have been cancelled by the controller are "retired": a
//! late fill on a retired or stale handle never re-prices the brackets, it
//! only triggers a flattening market order if the position is open.

use super::handles::RoleHandles;
use super::journal::{Journal, JournalEntry, JournalKind};
use super::params::{EntryOrder, StrategyParams};
use crate::domain::{
    Bar, Fill, OrderEvent, OrderId, OrderRequest, OrderRole, OrderSide, OrderUpdate,
};
use crate::engine::gateway::{CancelOutcome, OrderGateway};
use crate::indicators::{build_oscillator, Oscillator};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegState {
    Idle,
    EntryPending,
    SingleLeg,
    ScaledLeg,
    ExitPending,
    Finished,
}

impl LegState {
    pub fn in_position(self) -> bool {
        matches!(self, LegState::SingleLeg | LegState::ScaledLeg)
    }
}

/// Prices and size of the trade currently open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub entry_bar: usize,
    /// Never changes once set; anchors the stop-loss.
    pub first_entry_price: f64,
    pub avg_price: f64,
    pub unit_size: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub scale_in_price: f64,
    pub scaled: bool,
}

impl Leg {
    pub fn position_size(&self) -> f64 {
        if self.scaled {
            self.unit_size * 2.0
        } else {
            self.unit_size
        }
    }
}

pub struct LifecycleController {
    params: StrategyParams,
    oscillator: Box<dyn Oscillator>,
    state: LegState,
    handles: RoleHandles,
    /// Handles cancelled by the controller whose `Canceled` notification is still due.
    retired: BTreeMap<OrderId, OrderRole>,
    leg: Option<Leg>,
    last_trade_day: Option<NaiveDate>,
    last_signal_day: Option<NaiveDate>,
    last_exit_bar: Option<usize>,
    signal_days: Vec<NaiveDate>,
    journal: Journal,
}

impl LifecycleController {
    pub fn new(params: StrategyParams) -> Self {
        let oscillator = build_oscillator(params.oscillator, params.mfi_period);
        Self::with_oscillator(params, oscillator)
    }

    /// Controller with an explicitly supplied oscillator.
    pub fn with_oscillator(params: StrategyParams, oscillator: Box<dyn Oscillator>) -> Self {
        Self {
            params,
            oscillator,
            state: LegState::Idle,
            handles: RoleHandles::default(),
            retired: BTreeMap::new(),
            leg: None,
            last_trade_day: None,
            last_signal_day: None,
            last_exit_bar: None,
            signal_days: Vec::new(),
            journal: Journal::default(),
        }
    }

    // ── Read-only view ─────────────────────────────────────────────────

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn state(&self) -> LegState {
        self.state
    }

    pub fn leg(&self) -> Option<&Leg> {
        self.leg.as_ref()
    }

    pub fn handle(&self, role: OrderRole) -> Option<OrderId> {
        self.handles.get(role)
    }

    pub fn last_trade_day(&self) -> Option<NaiveDate> {
        self.last_trade_day
    }

    pub fn last_exit_bar(&self) -> Option<usize> {
        self.last_exit_bar
    }

    pub fn oscillator_value(&self) -> Option<f64> {
        self.oscillator.value()
    }

    /// Calendar day of every entry order submitted, in order.
    pub fn signal_days(&self) -> &[NaiveDate] {
        &self.signal_days
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn into_journal(self) -> Journal {
        self.journal
    }

    // ── Bar and notification handlers ──────────────────────────────────

    /// Per-bar decision. Updates the oscillator, then submits an entry if
    /// flat, nothing is pending, no entry has happened today, and the score
    /// is at or below the entry level.
    pub fn on_bar(&mut self, bar_index: usize, bar: &Bar, gateway: &mut dyn OrderGateway) {
        let score = self.oscillator.update(bar);
        if self.params.log_each_bar {
            info!(bar = bar_index, time = %bar.timestamp, open = bar.open, score = ?score, "bar");
        } else {
            debug!(bar = bar_index, time = %bar.timestamp, open = bar.open, score = ?score, "bar");
        }

        if self.state != LegState::Idle || !gateway.position().is_flat() {
            return;
        }
        let today = bar.date();
        if self.last_trade_day == Some(today) || self.last_signal_day == Some(today) {
            return;
        }
        let Some(score) = score else {
            return;
        };
        if score > self.params.mfi_entry_level {
            return;
        }

        let size = self.params.entry_size(bar.close);
        if size <= 0.0 {
            warn!(bar = bar_index, close = bar.close, "entry size rounds to zero, skipping signal");
            return;
        }

        let request = match self.params.entry_order {
            EntryOrder::Market => OrderRequest::market(OrderSide::Buy, size, OrderRole::Entry),
            EntryOrder::Limit => OrderRequest::limit(
                OrderSide::Buy,
                self.params.limit_entry_price(bar.close),
                size,
                OrderRole::Entry,
            )
            .valid_until(bar.timestamp + Duration::days(i64::from(self.params.entry_expiration_days))),
        };
        let price = request.order_type.level().unwrap_or(bar.close);
        let id = gateway.submit(request);
        self.handles.set(OrderRole::Entry, id);
        self.last_signal_day = Some(today);
        self.signal_days.push(today);
        self.state = LegState::EntryPending;

        info!(bar = bar_index, score, price, size, order = %id, "entry signal");
        self.record(bar_index, bar.timestamp, JournalKind::Signal, price, size, None);
    }

    /// Status notification for one order.
    pub fn on_order_event(&mut self, event: &OrderEvent, gateway: &mut dyn OrderGateway) {
        match &event.update {
            OrderUpdate::Submitted | OrderUpdate::Accepted => {
                debug!(order = %event.order_id, role = %event.role, status = ?event.update.status(), "order acknowledged");
            }
            OrderUpdate::Filled(fill) => self.on_fill(event, fill, gateway),
            _ => self.on_dead(event),
        }
    }

    /// Authoritative "position is flat" confirmation from the broker.
    /// Only completes an exit; ignored in every other state.
    pub fn on_position_flat(&mut self, gateway: &mut dyn OrderGateway) {
        if self.state != LegState::ExitPending {
            return;
        }
        for role in self.handles.roles() {
            self.retire(role, gateway);
        }
        self.leg = None;
        self.last_exit_bar = None;
        self.state = LegState::Idle;
        debug!("position flat, controller idle");
    }

    /// End of run: cancel every pending order and flatten any residual position.
    pub fn finish(&mut self, bar_index: usize, gateway: &mut dyn OrderGateway) {
        for role in self.handles.roles() {
            if role != OrderRole::Close {
                self.retire(role, gateway);
            }
        }
        self.flatten_residual(bar_index, gateway);
        self.state = LegState::Finished;
    }

    // ── Fill handling ──────────────────────────────────────────────────

    fn on_fill(&mut self, event: &OrderEvent, fill: &Fill, gateway: &mut dyn OrderGateway) {
        let current = self.handles.is_current(event.role, event.order_id);
        if current {
            self.handles.take(event.role);
        }

        match event.role {
            OrderRole::Entry => self.on_entry_fill(event, fill, current, gateway),
            OrderRole::ScaleIn => self.on_scale_in_fill(event, fill, current, gateway),
            OrderRole::TakeProfit | OrderRole::StopLoss => self.on_exit_fill(event, fill, gateway),
            OrderRole::Close => {
                info!(bar = event.bar_index, price = fill.price, quantity = fill.quantity, pnl = ?fill.pnl, "position closed");
                self.record_fill(event, JournalKind::Close, fill);
                self.flatten_residual(event.bar_index, gateway);
            }
        }
    }

    fn on_entry_fill(
        &mut self,
        event: &OrderEvent,
        fill: &Fill,
        current: bool,
        gateway: &mut dyn OrderGateway,
    ) {
        if !current || self.state != LegState::EntryPending {
            warn!(order = %event.order_id, state = ?self.state, "unexpected entry fill, flattening");
            self.flatten_residual(event.bar_index, gateway);
            return;
        }

        let first = fill.price;
        let unit = fill.quantity;
        let leg = Leg {
            entry_bar: event.bar_index,
            first_entry_price: first,
            avg_price: first,
            unit_size: unit,
            take_profit_price: self.params.take_profit_price(first),
            stop_loss_price: self.params.stop_loss_price(first),
            scale_in_price: self.params.scale_in_price(first),
            scaled: false,
        };

        self.submit_as(
            OrderRequest::limit(OrderSide::Sell, leg.take_profit_price, unit, OrderRole::TakeProfit),
            gateway,
        );
        self.submit_as(
            OrderRequest::stop(OrderSide::Sell, leg.stop_loss_price, unit, OrderRole::StopLoss),
            gateway,
        );
        self.submit_as(
            OrderRequest::limit(OrderSide::Buy, leg.scale_in_price, unit, OrderRole::ScaleIn),
            gateway,
        );

        self.last_trade_day = Some(event.timestamp.date());
        self.leg = Some(leg);
        self.state = LegState::SingleLeg;

        info!(
            bar = event.bar_index,
            price = first,
            quantity = unit,
            tp = leg.take_profit_price,
            sl = leg.stop_loss_price,
            scale_in = leg.scale_in_price,
            "entry filled"
        );
        self.record_fill(event, JournalKind::Entry, fill);
    }

    fn on_scale_in_fill(
        &mut self,
        event: &OrderEvent,
        fill: &Fill,
        current: bool,
        gateway: &mut dyn OrderGateway,
    ) {
        let same_bar_as_exit = self.last_exit_bar == Some(event.bar_index);
        let leg = match self.leg {
            Some(leg) if current && self.state == LegState::SingleLeg && !same_bar_as_exit => leg,
            _ => {
                warn!(
                    bar = event.bar_index,
                    order = %event.order_id,
                    price = fill.price,
                    state = ?self.state,
                    "scale-in filled after exit, flattening"
                );
                self.record_fill(event, JournalKind::SpuriousScaleIn, fill);
                self.flatten_residual(event.bar_index, gateway);
                return;
            }
        };

        self.retire(OrderRole::TakeProfit, gateway);
        self.retire(OrderRole::StopLoss, gateway);

        let new_avg = (leg.first_entry_price + fill.price) / 2.0;
        let combined = leg.unit_size * 2.0;
        let scaled = Leg {
            avg_price: new_avg,
            take_profit_price: self.params.take_profit_after_scale(new_avg),
            scaled: true,
            ..leg
        };

        self.submit_as(
            OrderRequest::limit(
                OrderSide::Sell,
                scaled.take_profit_price,
                combined,
                OrderRole::TakeProfit,
            ),
            gateway,
        );
        self.submit_as(
            OrderRequest::stop(OrderSide::Sell, scaled.stop_loss_price, combined, OrderRole::StopLoss),
            gateway,
        );

        self.leg = Some(scaled);
        self.state = LegState::ScaledLeg;

        info!(
            bar = event.bar_index,
            price = fill.price,
            avg = new_avg,
            quantity = combined,
            tp = scaled.take_profit_price,
            sl = scaled.stop_loss_price,
            "scale-in filled"
        );
        self.record_fill(event, JournalKind::ScaleIn, fill);
    }

    fn on_exit_fill(&mut self, event: &OrderEvent, fill: &Fill, gateway: &mut dyn OrderGateway) {
        let kind = if event.role == OrderRole::TakeProfit {
            JournalKind::TakeProfit
        } else {
            JournalKind::StopLoss
        };
        info!(
            bar = event.bar_index,
            role = %event.role,
            price = fill.price,
            quantity = fill.quantity,
            pnl = ?fill.pnl,
            "exit filled"
        );
        self.record_fill(event, kind, fill);

        if self.state.in_position() {
            self.last_exit_bar = Some(event.bar_index);
            for role in [OrderRole::TakeProfit, OrderRole::StopLoss, OrderRole::ScaleIn] {
                self.retire(role, gateway);
            }
            self.state = LegState::ExitPending;
        }
        self.flatten_residual(event.bar_index, gateway);
    }

    // ── Dead orders ────────────────────────────────────────────────────

    fn on_dead(&mut self, event: &OrderEvent) {
        if self.retired.remove(&event.order_id).is_some() {
            debug!(order = %event.order_id, role = %event.role, "retired order settled");
            return;
        }
        if !self.handles.is_current(event.role, event.order_id) {
            debug!(order = %event.order_id, role = %event.role, status = ?event.update.status(), "stale notification ignored");
            return;
        }
        self.handles.take(event.role);
        let status = event.update.status();

        match (event.role, self.state) {
            (OrderRole::Entry, LegState::EntryPending) => {
                info!(bar = event.bar_index, order = %event.order_id, ?status, "entry order did not fill");
                self.state = LegState::Idle;
                self.record(event.bar_index, event.timestamp, JournalKind::EntryCanceled, 0.0, 0.0, None);
            }
            (role, _) => {
                // No retry: the position stays without this order until the
                // next transition re-establishes it.
                warn!(bar = event.bar_index, order = %event.order_id, %role, ?status, "order lost");
                self.record(event.bar_index, event.timestamp, JournalKind::OrderLost(role), 0.0, 0.0, None);
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn submit_as(&mut self, request: OrderRequest, gateway: &mut dyn OrderGateway) -> OrderId {
        let role = request.role;
        let id = gateway.submit(request);
        self.handles.set(role, id);
        id
    }

    /// Cancel the live order for `role`, if any, and forget its handle.
    fn retire(&mut self, role: OrderRole, gateway: &mut dyn OrderGateway) {
        let Some(id) = self.handles.take(role) else {
            return;
        };
        match gateway.cancel(id) {
            CancelOutcome::Canceled => {
                self.retired.insert(id, role);
            }
            CancelOutcome::AlreadySettled => {
                debug!(order = %id, %role, "retire: already settled");
            }
        }
    }

    /// Submit a market order closing whatever the broker says is open,
    /// unless one is already working.
    fn flatten_residual(&mut self, bar_index: usize, gateway: &mut dyn OrderGateway) {
        let position = gateway.position();
        if position.is_flat() || self.handles.get(OrderRole::Close).is_some() {
            return;
        }
        let side = if position.quantity > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let id = self.submit_as(
            OrderRequest::market(side, position.quantity.abs(), OrderRole::Close),
            gateway,
        );
        info!(bar = bar_index, quantity = position.quantity, order = %id, "flattening residual position");
    }

    fn record_fill(&mut self, event: &OrderEvent, kind: JournalKind, fill: &Fill) {
        self.record(
            event.bar_index,
            event.timestamp,
            kind,
            fill.price,
            fill.quantity,
            fill.pnl,
        );
    }

    fn record(
        &mut self,
        bar_index: usize,
        timestamp: NaiveDateTime,
        kind: JournalKind,
        price: f64,
        quantity: f64,
        pnl: Option<f64>,
    ) {
        self.journal.record(JournalEntry {
            bar_index,
            timestamp,
            kind,
            price,
            quantity,
            pnl,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderType, Position};
    use chrono::NaiveDate;

    /// Oscillator returning a fixed script of values.
    struct Scripted {
        values: Vec<Option<f64>>,
        next: usize,
        current: Option<f64>,
    }

    impl Scripted {
        fn boxed(values: Vec<Option<f64>>) -> Box<dyn Oscillator> {
            Box::new(Self {
                values,
                next: 0,
                current: None,
            })
        }
    }

    impl Oscillator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn lookback(&self) -> usize {
            0
        }
        fn update(&mut self, _bar: &Bar) -> Option<f64> {
            self.current = self.values.get(self.next).copied().flatten();
            self.next += 1;
            self.current
        }
        fn value(&self) -> Option<f64> {
            self.current
        }
        fn reset(&mut self) {
            self.next = 0;
            self.current = None;
        }
    }

    /// Records requests and cancels; fills are injected by the test.
    #[derive(Default)]
    struct MockGateway {
        next_id: u64,
        submitted: Vec<(OrderId, OrderRequest)>,
        canceled: Vec<OrderId>,
        settled: Vec<OrderId>,
        position: Position,
    }

    impl MockGateway {
        fn request(&self, id: OrderId) -> &OrderRequest {
            &self.submitted.iter().find(|(i, _)| *i == id).unwrap().1
        }
    }

    impl OrderGateway for MockGateway {
        fn submit(&mut self, request: OrderRequest) -> OrderId {
            self.next_id += 1;
            let id = OrderId(self.next_id);
            self.submitted.push((id, request));
            id
        }
        fn cancel(&mut self, id: OrderId) -> CancelOutcome {
            if self.settled.contains(&id) || self.canceled.contains(&id) {
                CancelOutcome::AlreadySettled
            } else {
                self.canceled.push(id);
                CancelOutcome::Canceled
            }
        }
        fn position(&self) -> Position {
            self.position
        }
    }

    fn ts(bar: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(30 * bar as i64)
    }

    fn bar(i: usize, close: f64) -> Bar {
        Bar {
            timestamp: ts(i),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn params() -> StrategyParams {
        StrategyParams {
            sizing: crate::strategy::Sizing::Units { units: 100.0 },
            log_each_bar: false,
            ..StrategyParams::default()
        }
    }

    /// Apply a fill to the mock position and build its notification.
    fn fill_event(gw: &mut MockGateway, id: OrderId, bar_index: usize, price: f64) -> OrderEvent {
        gw.settled.push(id);
        let req = gw.request(id).clone();
        let pnl = gw.position.apply(req.side, req.quantity, price);
        OrderEvent {
            order_id: id,
            role: req.role,
            bar_index,
            timestamp: ts(bar_index),
            update: OrderUpdate::Filled(Fill {
                order_id: id,
                role: req.role,
                bar_index,
                timestamp: ts(bar_index),
                side: req.side,
                price,
                quantity: req.quantity,
                commission: 0.0,
                slippage: 0.0,
                pnl,
            }),
        }
    }

    fn dead_event(id: OrderId, role: OrderRole, bar_index: usize, update: OrderUpdate) -> OrderEvent {
        OrderEvent {
            order_id: id,
            role,
            bar_index,
            timestamp: ts(bar_index),
            update,
        }
    }

    /// Controller with an entry filled at 1.00 on bar 0; brackets live.
    fn entered() -> (LifecycleController, MockGateway) {
        let mut ctl = LifecycleController::with_oscillator(params(), Scripted::boxed(vec![Some(5.0)]));
        let mut gw = MockGateway::default();
        ctl.on_bar(0, &bar(0, 1.0), &mut gw);
        let entry = ctl.handle(OrderRole::Entry).unwrap();
        let ev = fill_event(&mut gw, entry, 0, 1.0);
        ctl.on_order_event(&ev, &mut gw);
        (ctl, gw)
    }

    #[test]
    fn no_entry_while_warming_up() {
        let mut ctl =
            LifecycleController::with_oscillator(params(), Scripted::boxed(vec![None, None, Some(50.0)]));
        let mut gw = MockGateway::default();
        for i in 0..3 {
            ctl.on_bar(i, &bar(i, 1.0), &mut gw);
        }
        assert!(gw.submitted.is_empty());
        assert_eq!(ctl.state(), LegState::Idle);
    }

    #[test]
    fn signal_submits_market_entry() {
        let mut ctl = LifecycleController::with_oscillator(params(), Scripted::boxed(vec![Some(10.0)]));
        let mut gw = MockGateway::default();
        ctl.on_bar(0, &bar(0, 1.0), &mut gw);
        assert_eq!(ctl.state(), LegState::EntryPending);
        let (_, req) = &gw.submitted[0];
        assert_eq!(req.order_type, OrderType::Market);
        assert_eq!(req.role, OrderRole::Entry);
        assert_eq!(req.quantity, 100.0);
    }

    #[test]
    fn limit_entry_variant_prices_below_close_with_expiry() {
        let p = StrategyParams {
            entry_order: EntryOrder::Limit,
            ..params()
        };
        let mut ctl = LifecycleController::with_oscillator(p, Scripted::boxed(vec![Some(1.0)]));
        let mut gw = MockGateway::default();
        ctl.on_bar(0, &bar(0, 1.0), &mut gw);
        let (_, req) = &gw.submitted[0];
        assert_eq!(req.order_type, OrderType::Limit { limit_price: 1.0 * (1.0 - 0.04) });
        assert_eq!(req.valid_until, Some(ts(0) + Duration::days(1)));
    }

    #[test]
    fn entry_fill_places_brackets_and_scale_in() {
        let (ctl, gw) = entered();
        assert_eq!(ctl.state(), LegState::SingleLeg);
        let leg = ctl.leg().unwrap();
        assert_eq!(leg.first_entry_price, 1.0);

        let tp = gw.request(ctl.handle(OrderRole::TakeProfit).unwrap());
        let sl = gw.request(ctl.handle(OrderRole::StopLoss).unwrap());
        let si = gw.request(ctl.handle(OrderRole::ScaleIn).unwrap());
        assert_eq!(tp.order_type, OrderType::Limit { limit_price: 1.0 * (1.0 + 0.015) });
        assert_eq!(sl.order_type, OrderType::Stop { trigger_price: 1.0 * (1.0 - 0.09) });
        assert_eq!(si.order_type, OrderType::Limit { limit_price: 1.0 * (1.0 - 0.04) });
        assert!([tp, sl, si].iter().all(|r| r.quantity == 100.0));
        assert_eq!(ctl.last_trade_day(), Some(ts(0).date()));
    }

    #[test]
    fn canceled_entry_returns_to_idle() {
        let mut ctl = LifecycleController::with_oscillator(params(), Scripted::boxed(vec![Some(5.0)]));
        let mut gw = MockGateway::default();
        ctl.on_bar(0, &bar(0, 1.0), &mut gw);
        let entry = ctl.handle(OrderRole::Entry).unwrap();
        ctl.on_order_event(&dead_event(entry, OrderRole::Entry, 0, OrderUpdate::Margin), &mut gw);
        assert_eq!(ctl.state(), LegState::Idle);
        assert_eq!(ctl.handle(OrderRole::Entry), None);
        assert_eq!(ctl.journal().count(JournalKind::EntryCanceled), 1);
    }

    #[test]
    fn scale_in_reprices_take_profit_and_keeps_stop() {
        let (mut ctl, mut gw) = entered();
        let sl_before = ctl.leg().unwrap().stop_loss_price;
        let old_tp = ctl.handle(OrderRole::TakeProfit).unwrap();
        let old_sl = ctl.handle(OrderRole::StopLoss).unwrap();
        let si = ctl.handle(OrderRole::ScaleIn).unwrap();

        let ev = fill_event(&mut gw, si, 3, 0.96);
        ctl.on_order_event(&ev, &mut gw);

        assert_eq!(ctl.state(), LegState::ScaledLeg);
        assert_eq!(gw.canceled, vec![old_tp, old_sl]);
        let leg = ctl.leg().unwrap();
        assert_eq!(leg.avg_price, (1.0 + 0.96) / 2.0);
        assert_eq!(leg.stop_loss_price.to_bits(), sl_before.to_bits());

        let tp = gw.request(ctl.handle(OrderRole::TakeProfit).unwrap());
        let sl = gw.request(ctl.handle(OrderRole::StopLoss).unwrap());
        assert_eq!(tp.order_type, OrderType::Limit { limit_price: leg.take_profit_price });
        assert!((leg.take_profit_price - 0.98098).abs() < 1e-12);
        assert_eq!(sl.order_type, OrderType::Stop { trigger_price: sl_before });
        assert_eq!(tp.quantity, 200.0);
        assert_eq!(sl.quantity, 200.0);
        assert_eq!(ctl.handle(OrderRole::ScaleIn), None);
    }

    #[test]
    fn take_profit_retires_siblings_and_waits_for_flat() {
        let (mut ctl, mut gw) = entered();
        let tp = ctl.handle(OrderRole::TakeProfit).unwrap();
        let sl = ctl.handle(OrderRole::StopLoss).unwrap();
        let si = ctl.handle(OrderRole::ScaleIn).unwrap();

        let ev = fill_event(&mut gw, tp, 2, 1.015);
        ctl.on_order_event(&ev, &mut gw);
        assert_eq!(ctl.state(), LegState::ExitPending);
        assert_eq!(ctl.last_exit_bar(), Some(2));
        assert_eq!(gw.canceled, vec![sl, si]);

        // the cancels come back; they are swallowed
        ctl.on_order_event(&dead_event(sl, OrderRole::StopLoss, 2, OrderUpdate::Canceled), &mut gw);
        ctl.on_order_event(&dead_event(si, OrderRole::ScaleIn, 2, OrderUpdate::Canceled), &mut gw);
        assert_eq!(ctl.journal().count(JournalKind::OrderLost(OrderRole::ScaleIn)), 0);

        ctl.on_position_flat(&mut gw);
        assert_eq!(ctl.state(), LegState::Idle);
        assert!(ctl.leg().is_none());
        assert_eq!(ctl.last_exit_bar(), None);
        // still blocks a second entry on the same day
        assert_eq!(ctl.last_trade_day(), Some(ts(0).date()));
    }

    #[test]
    fn scale_in_on_exit_bar_is_flattened_not_a_new_trade() {
        let (mut ctl, mut gw) = entered();
        let tp = ctl.handle(OrderRole::TakeProfit).unwrap();
        let si = ctl.handle(OrderRole::ScaleIn).unwrap();

        // both filled inside the broker before any notification went out
        let tp_ev = fill_event(&mut gw, tp, 100, 1.015);
        let si_ev = fill_event(&mut gw, si, 100, 0.96);
        assert!((gw.position.quantity - 100.0).abs() < 1e-9);

        ctl.on_order_event(&tp_ev, &mut gw);
        assert_eq!(ctl.state(), LegState::ExitPending);
        let close = ctl.handle(OrderRole::Close).expect("close submitted");
        assert_eq!(gw.request(close).side, OrderSide::Sell);
        assert_eq!(gw.request(close).quantity, 100.0);

        ctl.on_order_event(&si_ev, &mut gw);
        assert_eq!(ctl.journal().count(JournalKind::SpuriousScaleIn), 1);
        assert_eq!(ctl.journal().count(JournalKind::ScaleIn), 0);
        assert_eq!(ctl.leg().unwrap().first_entry_price, 1.0);
        assert!(!ctl.leg().unwrap().scaled);
        // no duplicate close
        let closes = gw
            .submitted
            .iter()
            .filter(|(_, r)| r.role == OrderRole::Close)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn late_bracket_fill_after_scale_in_still_closes() {
        let (mut ctl, mut gw) = entered();
        let old_tp = ctl.handle(OrderRole::TakeProfit).unwrap();
        let si = ctl.handle(OrderRole::ScaleIn).unwrap();

        let si_ev = fill_event(&mut gw, si, 5, 0.96);
        let tp_ev = fill_event(&mut gw, old_tp, 5, 1.015);
        ctl.on_order_event(&si_ev, &mut gw);
        assert_eq!(ctl.state(), LegState::ScaledLeg);

        ctl.on_order_event(&tp_ev, &mut gw);
        assert_eq!(ctl.state(), LegState::ExitPending);
        assert_eq!(ctl.handle(OrderRole::TakeProfit), None);
        assert_eq!(ctl.handle(OrderRole::StopLoss), None);
        assert!(ctl.handle(OrderRole::Close).is_some());
    }

    #[test]
    fn lost_bracket_is_logged_without_retry() {
        let (mut ctl, mut gw) = entered();
        let sl = ctl.handle(OrderRole::StopLoss).unwrap();
        let before = gw.submitted.len();
        ctl.on_order_event(
            &dead_event(sl, OrderRole::StopLoss, 1, OrderUpdate::Rejected { reason: "test".into() }),
            &mut gw,
        );
        assert_eq!(ctl.state(), LegState::SingleLeg);
        assert_eq!(ctl.handle(OrderRole::StopLoss), None);
        assert_eq!(gw.submitted.len(), before);
        assert_eq!(ctl.journal().count(JournalKind::OrderLost(OrderRole::StopLoss)), 1);
    }

    #[test]
    fn stale_notifications_do_not_mutate_state() {
        let (mut ctl, mut gw) = entered();
        let handles_before: Vec<_> = [OrderRole::TakeProfit, OrderRole::StopLoss, OrderRole::ScaleIn]
            .iter()
            .map(|r| ctl.handle(*r))
            .collect();
        ctl.on_order_event(&dead_event(OrderId(999), OrderRole::TakeProfit, 1, OrderUpdate::Canceled), &mut gw);
        let handles_after: Vec<_> = [OrderRole::TakeProfit, OrderRole::StopLoss, OrderRole::ScaleIn]
            .iter()
            .map(|r| ctl.handle(*r))
            .collect();
        assert_eq!(handles_before, handles_after);
        assert_eq!(ctl.state(), LegState::SingleLeg);
    }

    #[test]
    fn one_signal_per_day() {
        let mut ctl = LifecycleController::with_oscillator(
            params(),
            Scripted::boxed(vec![Some(5.0), Some(5.0), Some(5.0)]),
        );
        let mut gw = MockGateway::default();
        ctl.on_bar(0, &bar(0, 1.0), &mut gw);
        let entry = ctl.handle(OrderRole::Entry).unwrap();
        ctl.on_order_event(&dead_event(entry, OrderRole::Entry, 0, OrderUpdate::Rejected { reason: "x".into() }), &mut gw);
        assert_eq!(ctl.state(), LegState::Idle);

        ctl.on_bar(1, &bar(1, 1.0), &mut gw);
        ctl.on_bar(2, &bar(2, 1.0), &mut gw);
        assert_eq!(gw.submitted.len(), 1);
        assert_eq!(ctl.signal_days().len(), 1);
    }

    #[test]
    fn finish_cancels_and_flattens() {
        let (mut ctl, mut gw) = entered();
        ctl.finish(9, &mut gw);
        assert_eq!(ctl.state(), LegState::Finished);
        assert_eq!(gw.canceled.len(), 3);
        let close = ctl.handle(OrderRole::Close).unwrap();
        assert_eq!(gw.request(close).quantity, 100.0);
        assert_eq!(gw.request(close).order_type, OrderType::Market);
    }
}
