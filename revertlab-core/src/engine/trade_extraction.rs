//! Trade extraction: converts raw fills into round-trip `TradeRecord`s.
//!
//! Post-processes fills after the bar loop completes. A trade runs from the
//! fill that opens a flat position to the fill that brings it back to flat,
//! so a scale-in is part of the trade it re-averages.
//!
//! A scale-in that fills after its trade already closed (same-bar race) is
//! not a new trade: its P&L and commission fold into the trade it raced.

use crate::domain::{Fill, OrderRole, Position, TradeRecord};

/// State for the trade being tracked during extraction.
struct OpenTrade {
    entry_bar: usize,
    entry_time: chrono::NaiveDateTime,
    first_entry_price: f64,
    opened_qty: f64,
    opened_notional: f64,
    closed_qty: f64,
    closed_notional: f64,
    max_quantity: f64,
    opening_fills: usize,
    scale_in: bool,
    gross_pnl: f64,
    commission: f64,
}

impl OpenTrade {
    fn start(fill: &Fill, quantity: f64) -> Self {
        Self {
            entry_bar: fill.bar_index,
            entry_time: fill.timestamp,
            first_entry_price: fill.price,
            opened_qty: 0.0,
            opened_notional: 0.0,
            closed_qty: 0.0,
            closed_notional: 0.0,
            max_quantity: quantity,
            opening_fills: 0,
            scale_in: false,
            gross_pnl: 0.0,
            commission: 0.0,
        }
    }

    /// Adds a race residual's P&L and commission to the trade it raced.
    fn fold_into(self, trade: &mut TradeRecord) {
        trade.gross_pnl += self.gross_pnl;
        trade.commission += self.commission;
        trade.net_pnl = trade.gross_pnl - trade.commission;
    }

    fn finish(self, exit: &Fill) -> TradeRecord {
        let avg = |notional: f64, qty: f64| if qty > 0.0 { notional / qty } else { 0.0 };
        TradeRecord {
            entry_bar: self.entry_bar,
            entry_time: self.entry_time,
            exit_bar: exit.bar_index,
            exit_time: exit.timestamp,
            first_entry_price: self.first_entry_price,
            avg_entry_price: avg(self.opened_notional, self.opened_qty),
            avg_exit_price: avg(self.closed_notional, self.closed_qty),
            max_quantity: self.max_quantity,
            scaled_in: self.scale_in || self.opening_fills > 1,
            exit_reason: exit.role,
            gross_pnl: self.gross_pnl,
            commission: self.commission,
            net_pnl: self.gross_pnl - self.commission,
            bars_held: exit.bar_index.saturating_sub(self.entry_bar),
        }
    }
}

/// Extract round-trip trades from fills in execution order.
///
/// A trade still open at the end of the fills is not reported.
pub fn extract_trades(fills: &[Fill]) -> Vec<TradeRecord> {
    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut position = Position::default();
    let mut open: Option<OpenTrade> = None;
    let mut residual = false;

    for fill in fills {
        let was_flat = position.is_flat();
        let before = position.quantity;
        let pnl = position.apply(fill.side, fill.quantity, fill.price);

        if was_flat && open.is_none() {
            residual = fill.role == OrderRole::ScaleIn && !trades.is_empty();
        }

        let trade = open.get_or_insert_with(|| OpenTrade::start(fill, fill.quantity));
        trade.commission += fill.commission;

        match pnl {
            None => {
                trade.opened_qty += fill.quantity;
                trade.opened_notional += fill.notional();
                trade.opening_fills += 1;
                trade.scale_in |= !was_flat && fill.role == OrderRole::ScaleIn;
                trade.max_quantity = trade.max_quantity.max(position.quantity.abs());
            }
            Some(gross) => {
                let closed = fill.quantity.min(before.abs());
                trade.closed_qty += closed;
                trade.closed_notional += closed * fill.price;
                trade.gross_pnl += gross;
            }
        }

        let flipped =
            !was_flat && !position.is_flat() && position.quantity.signum() != before.signum();
        if position.is_flat() || flipped {
            if let Some(done) = open.take() {
                match trades.len().checked_sub(1) {
                    Some(last) if residual => done.fold_into(&mut trades[last]),
                    _ => trades.push(done.finish(fill)),
                }
            }
            residual = false;
            if flipped {
                let mut next = OpenTrade::start(fill, position.quantity.abs());
                next.opened_qty = position.quantity.abs();
                next.opened_notional = position.quantity.abs() * fill.price;
                next.opening_fills = 1;
                open = Some(next);
            }
        }
    }

    trades
}
