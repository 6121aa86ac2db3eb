//! Trigger checking: does a bar reach a resting order, and where on the path?
//!
//! Computes the raw fill price before slippage/commission and the position
//! along the inferred intrabar path, used to sequence orders within a bar.
//! Gap-through stop fills follow the configured `GapPolicy`.

use super::path_policy::BarPath;
use crate::domain::{Order, OrderSide, OrderType};
use serde::{Deserialize, Serialize};

/// Fill price for a stop the bar opened through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Fill at the open (worse for the stopped-out side).
    #[default]
    FillAtOpen,
    /// Fill at the trigger price.
    FillAtTrigger,
}

/// Where and at what raw price an order fills within a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    /// 0.0 for a fill at the open, otherwise `segment + fraction` along the path.
    pub position: f64,
    pub raw_price: f64,
    pub gap_through: bool,
}

/// Check a resting order against a bar. Market orders never trigger here.
pub fn check_trigger(order: &Order, path: &BarPath, gap_policy: GapPolicy) -> Option<Touch> {
    match (&order.order_type, order.side) {
        (OrderType::Market, _) => None,
        (OrderType::Limit { limit_price }, OrderSide::Buy) => {
            falling_to(*limit_price, path, path.open())
        }
        (OrderType::Limit { limit_price }, OrderSide::Sell) => {
            rising_to(*limit_price, path, path.open())
        }
        (OrderType::Stop { trigger_price }, OrderSide::Sell) => {
            let gap_fill = resolve_gap(path.open(), *trigger_price, gap_policy);
            falling_to(*trigger_price, path, gap_fill)
        }
        (OrderType::Stop { trigger_price }, OrderSide::Buy) => {
            let gap_fill = resolve_gap(path.open(), *trigger_price, gap_policy);
            rising_to(*trigger_price, path, gap_fill)
        }
    }
}

/// Buy limit or sell stop: fills once price trades at or below `level`.
fn falling_to(level: f64, path: &BarPath, gap_fill: f64) -> Option<Touch> {
    if path.open() <= level {
        return Some(Touch {
            position: 0.0,
            raw_price: gap_fill,
            gap_through: true,
        });
    }
    path.first_down_touch(level).map(|position| Touch {
        position,
        raw_price: level,
        gap_through: false,
    })
}

/// Sell limit or buy stop: fills once price trades at or above `level`.
fn rising_to(level: f64, path: &BarPath, gap_fill: f64) -> Option<Touch> {
    if path.open() >= level {
        return Some(Touch {
            position: 0.0,
            raw_price: gap_fill,
            gap_through: true,
        });
    }
    path.first_up_touch(level).map(|position| Touch {
        position,
        raw_price: level,
        gap_through: false,
    })
}

fn resolve_gap(open: f64, trigger: f64, policy: GapPolicy) -> f64 {
    match policy {
        GapPolicy::FillAtOpen => open,
        GapPolicy::FillAtTrigger => trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, OrderId, OrderRequest, OrderRole};
    use chrono::NaiveDate;

    fn path(open: f64, high: f64, low: f64, close: f64) -> BarPath {
        BarPath::infer(&Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        })
    }

    fn order(req: OrderRequest) -> Order {
        Order::from_request(OrderId(1), req, 0)
    }

    #[test]
    fn sell_limit_fills_at_limit_when_high_reaches_it() {
        let tp = order(OrderRequest::limit(OrderSide::Sell, 1.015, 100.0, OrderRole::TakeProfit));
        let touch = check_trigger(&tp, &path(1.00, 1.02, 0.995, 1.01), GapPolicy::FillAtOpen).unwrap();
        assert_eq!(touch.raw_price, 1.015);
        assert!(!touch.gap_through);
    }

    #[test]
    fn sell_limit_not_reached() {
        let tp = order(OrderRequest::limit(OrderSide::Sell, 1.015, 100.0, OrderRole::TakeProfit));
        assert!(check_trigger(&tp, &path(1.00, 1.01, 0.99, 1.00), GapPolicy::FillAtOpen).is_none());
    }

    #[test]
    fn buy_limit_gap_fills_at_better_open() {
        let si = order(OrderRequest::limit(OrderSide::Buy, 0.96, 100.0, OrderRole::ScaleIn));
        let touch = check_trigger(&si, &path(0.91, 0.92, 0.90, 0.91), GapPolicy::FillAtOpen).unwrap();
        assert_eq!(touch.position, 0.0);
        assert_eq!(touch.raw_price, 0.91);
        assert!(touch.gap_through);
    }

    #[test]
    fn sell_stop_gap_respects_policy() {
        let sl = order(OrderRequest::stop(OrderSide::Sell, 0.91, 100.0, OrderRole::StopLoss));
        let p = path(0.88, 0.89, 0.87, 0.88);
        let at_open = check_trigger(&sl, &p, GapPolicy::FillAtOpen).unwrap();
        let at_trigger = check_trigger(&sl, &p, GapPolicy::FillAtTrigger).unwrap();
        assert_eq!(at_open.raw_price, 0.88);
        assert_eq!(at_trigger.raw_price, 0.91);
    }

    #[test]
    fn sell_stop_intrabar_fills_at_trigger() {
        let sl = order(OrderRequest::stop(OrderSide::Sell, 0.91, 100.0, OrderRole::StopLoss));
        let touch = check_trigger(&sl, &path(0.93, 0.935, 0.90, 0.92), GapPolicy::FillAtOpen).unwrap();
        assert_eq!(touch.raw_price, 0.91);
        assert!(touch.position > 0.0);
    }

    #[test]
    fn buy_stop_triggers_on_rise() {
        let stop = order(OrderRequest::stop(OrderSide::Buy, 1.05, 10.0, OrderRole::Close));
        let touch = check_trigger(&stop, &path(1.00, 1.06, 0.99, 1.04), GapPolicy::FillAtOpen).unwrap();
        assert_eq!(touch.raw_price, 1.05);
    }

    #[test]
    fn market_orders_never_trigger_intrabar() {
        let mkt = order(OrderRequest::market(OrderSide::Buy, 10.0, OrderRole::Entry));
        assert!(check_trigger(&mkt, &path(1.0, 1.1, 0.9, 1.0), GapPolicy::FillAtOpen).is_none());
    }
}
