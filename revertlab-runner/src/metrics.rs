//! Trade statistics: pure functions over closed trades and the equity curve.
//!
//! P&L figures are net of commission.

use revertlab_core::domain::{OrderRole, TradeRecord};
use revertlab_core::engine::RunResult;
use serde::{Deserialize, Serialize};

/// End-of-run aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub start_value: f64,
    pub final_value: f64,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Sum of net P&L over winning trades.
    pub win_pnl: f64,
    /// Sum of net P&L over losing trades (negative or zero).
    pub loss_pnl: f64,
    pub net_pnl: f64,
    pub total_commission: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Largest peak-to-trough decline as a negative fraction.
    pub max_drawdown: f64,
    /// Largest peak-to-trough decline in account currency.
    pub max_drawdown_abs: f64,
    pub scaled_trades: usize,
    pub take_profit_exits: usize,
    pub stop_loss_exits: usize,
    pub forced_exits: usize,
    pub avg_bars_held: f64,
}

impl TradeStats {
    pub fn compute(result: &RunResult) -> Self {
        let trades = &result.trades;
        let equity = result.equity_values();
        let exits = |role: OrderRole| trades.iter().filter(|t| t.exit_reason == role).count();

        Self {
            start_value: result.start_cash,
            final_value: result.final_equity,
            closed_trades: trades.len(),
            wins: trades.iter().filter(|t| t.is_winner()).count(),
            losses: trades.iter().filter(|t| t.is_loser()).count(),
            win_pnl: win_pnl(trades),
            loss_pnl: loss_pnl(trades),
            net_pnl: trades.iter().map(|t| t.net_pnl).sum(),
            total_commission: result.total_commission(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            max_drawdown: max_drawdown(&equity),
            max_drawdown_abs: max_drawdown_abs(&equity),
            scaled_trades: trades.iter().filter(|t| t.scaled_in).count(),
            take_profit_exits: exits(OrderRole::TakeProfit),
            stop_loss_exits: exits(OrderRole::StopLoss),
            forced_exits: exits(OrderRole::Close),
            avg_bars_held: avg_bars_held(trades),
        }
    }

    pub fn total_return(&self) -> f64 {
        if self.start_value <= 0.0 {
            return 0.0;
        }
        (self.final_value - self.start_value) / self.start_value
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn win_pnl(trades: &[TradeRecord]) -> f64 {
    trades.iter().filter(|t| t.is_winner()).map(|t| t.net_pnl).sum()
}

pub fn loss_pnl(trades: &[TradeRecord]) -> f64 {
    trades.iter().filter(|t| t.is_loser()).map(|t| t.net_pnl).sum()
}

/// Fraction of closed trades with positive net P&L.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at 100.0 when there are no losses.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit = win_pnl(trades);
    let gross_loss = loss_pnl(trades).abs();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Maximum drawdown in account currency (non-negative).
pub fn max_drawdown_abs(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        max_dd = max_dd.max(peak - eq);
    }
    max_dd
}

pub fn avg_bars_held(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.bars_held as f64).sum::<f64>() / trades.len() as f64
}
