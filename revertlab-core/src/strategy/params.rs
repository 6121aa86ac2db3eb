//! Strategy parameters: immutable, passed into the controller at construction.

use crate::indicators::OscillatorKind;
use serde::{Deserialize, Serialize};

/// How the entry order is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrder {
    /// Market buy, filled at the signal bar's close (or next open).
    #[default]
    Market,
    /// Limit buy at `close * (1 - first_entry_offset)`, expiring after
    /// `entry_expiration_days`.
    Limit,
}

/// Position size per leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sizing {
    /// Fixed number of units.
    Units { units: f64 },
    /// USD notional converted to units at the signal bar's close.
    Notional {
        notional_usd: f64,
        #[serde(default = "default_round_digits")]
        round_digits: u32,
    },
}

fn default_round_digits() -> u32 {
    2
}

impl Default for Sizing {
    fn default() -> Self {
        Sizing::Notional {
            notional_usd: 50.0,
            round_digits: default_round_digits(),
        }
    }
}

impl Sizing {
    pub fn units(&self, reference_price: f64) -> f64 {
        match *self {
            Sizing::Units { units } => units,
            Sizing::Notional {
                notional_usd,
                round_digits,
            } => {
                if reference_price <= 0.0 {
                    return 0.0;
                }
                round_to(notional_usd / reference_price, round_digits)
            }
        }
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub oscillator: OscillatorKind,
    pub mfi_period: usize,
    /// Enter when the oscillator is at or below this level.
    pub mfi_entry_level: f64,
    pub entry_order: EntryOrder,
    pub first_entry_offset: f64,
    pub entry_expiration_days: u32,
    pub tp_initial: f64,
    pub sl: f64,
    pub scale_in_offset: f64,
    pub tp_after_scale: f64,
    pub sizing: Sizing,
    pub max_entries_per_day: u32,
    /// Log open price and oscillator value on every bar at info level.
    pub log_each_bar: bool,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            oscillator: OscillatorKind::MoneyFlowIndex,
            mfi_period: 10,
            mfi_entry_level: 10.0,
            entry_order: EntryOrder::Market,
            first_entry_offset: 0.04,
            entry_expiration_days: 1,
            tp_initial: 0.015,
            sl: 0.09,
            scale_in_offset: 0.04,
            tp_after_scale: 0.001,
            sizing: Sizing::default(),
            max_entries_per_day: 1,
            log_each_bar: true,
        }
    }
}

impl StrategyParams {
    pub fn take_profit_price(&self, first_entry_price: f64) -> f64 {
        first_entry_price * (1.0 + self.tp_initial)
    }

    pub fn stop_loss_price(&self, first_entry_price: f64) -> f64 {
        first_entry_price * (1.0 - self.sl)
    }

    pub fn scale_in_price(&self, first_entry_price: f64) -> f64 {
        first_entry_price * (1.0 - self.scale_in_offset)
    }

    pub fn take_profit_after_scale(&self, avg_price: f64) -> f64 {
        avg_price * (1.0 + self.tp_after_scale)
    }

    pub fn limit_entry_price(&self, close: f64) -> f64 {
        close * (1.0 - self.first_entry_offset)
    }

    pub fn entry_size(&self, reference_price: f64) -> f64 {
        self.sizing.units(reference_price)
    }
}
