//! Cost model: slippage and commission calculation.
//!
//! Slippage is directional: buyers pay more (higher price), sellers receive less (lower price).
//! Commission is a fraction of fill notional, charged on every fill.

use crate::domain::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Slippage in basis points, applied directionally.
    pub slippage_bps: f64,
    /// Commission as a fraction of notional (0.001 = 0.1%).
    pub commission_rate: f64,
}

/// The fully computed fill price with all costs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedFill {
    pub price: f64,
    /// Cash amount of slippage applied.
    pub slippage: f64,
    pub commission: f64,
}

impl CostModel {
    pub fn new(slippage_bps: f64, commission_rate: f64) -> Self {
        Self {
            slippage_bps,
            commission_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Apply slippage to a raw fill price.
    ///
    /// Returns `(slipped_price, slippage_cash_amount)`.
    pub fn apply_slippage(&self, raw_price: f64, side: OrderSide, quantity: f64) -> (f64, f64) {
        if self.slippage_bps == 0.0 {
            return (raw_price, 0.0);
        }
        let slipped = raw_price * (1.0 + side.sign() * self.slippage_bps / 10_000.0);
        (slipped, (slipped - raw_price).abs() * quantity)
    }

    pub fn compute_commission(&self, fill_price: f64, quantity: f64) -> f64 {
        fill_price * quantity * self.commission_rate
    }

    /// Slippage, then commission on the slipped price.
    pub fn compute_fill(&self, raw_price: f64, side: OrderSide, quantity: f64) -> ComputedFill {
        let (price, slippage) = self.apply_slippage(raw_price, side, quantity);
        ComputedFill {
            price,
            slippage,
            commission: self.compute_commission(price, quantity),
        }
    }
}
