//! Bar-by-bar event loop: wires bars → controller → broker → notifications.
//!
//! Phases per bar:
//! 1. Start-of-bar: expire orders, fill next-open market orders
//! 2. Intrabar: limit/stop fills in path order
//! 3. Strategy: oscillator update and entry decision
//! 4. End-of-bar: fill same-bar-close market orders
//! 5. Post-bar: mark-to-market
//!
//! After every phase step, pending notifications are delivered to the
//! controller until the broker has nothing more to say, so all of a bar's
//! notifications are processed before the next bar is presented.

use crate::domain::Bar;
use crate::engine::execution::{ExecutionConfig, SimBroker};
use crate::engine::gateway::OrderGateway;
use crate::strategy::{LifecycleController, StrategyParams};

use super::state::{EquityPoint, RunResult};
use super::trade_extraction::extract_trades;

use tracing::debug;

/// Run a backtest of the strategy over `bars` (validated, timestamp-ordered).
pub fn run_backtest(bars: &[Bar], params: &StrategyParams, execution: &ExecutionConfig) -> RunResult {
    run_with_controller(bars, LifecycleController::new(params.clone()), execution)
}

/// Run a backtest with a pre-built controller (e.g. a custom oscillator).
pub fn run_with_controller(
    bars: &[Bar],
    mut controller: LifecycleController,
    execution: &ExecutionConfig,
) -> RunResult {
    let mut broker = SimBroker::new(execution.clone());
    let mut equity_curve = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        // ─── Phase 1: Start-of-bar ───
        broker.begin_bar(i, bar);
        dispatch(&mut controller, &mut broker);

        // ─── Phase 2: Intrabar ───
        while broker.step_intrabar() {
            dispatch(&mut controller, &mut broker);
        }

        // ─── Phase 3: Strategy ───
        controller.on_bar(i, bar, &mut broker);
        dispatch(&mut controller, &mut broker);

        // ─── Phase 4: End-of-bar ───
        while broker.fill_at_close() {
            dispatch(&mut controller, &mut broker);
        }

        // ─── Phase 5: Post-bar ───
        equity_curve.push(snapshot(i, bar, &broker));
    }

    if let Some((last, bar)) = bars.iter().enumerate().last() {
        controller.finish(last, &mut broker);
        dispatch(&mut controller, &mut broker);
        broker.close_out();
        dispatch(&mut controller, &mut broker);
        if let Some(point) = equity_curve.last_mut() {
            *point = snapshot(last, bar, &broker);
        }
        debug!(bars = bars.len(), fills = broker.fills().len(), "run complete");
    }

    let fills = broker.fills().to_vec();
    let trades = extract_trades(&fills);
    let final_equity = broker.equity();
    let final_position = broker.position();
    let audit_trail = broker.audit_trail().to_vec();
    let signal_days = controller.signal_days().to_vec();

    RunResult {
        start_cash: execution.start_cash,
        final_equity,
        equity_curve,
        fills,
        trades,
        journal: controller.into_journal().into_entries(),
        audit_trail,
        signal_days,
        final_position,
        bar_count: bars.len(),
    }
}

/// Deliver queued notifications and flat confirmations until both are exhausted.
fn dispatch(controller: &mut LifecycleController, broker: &mut SimBroker) {
    loop {
        let mut progressed = false;
        while let Some(event) = broker.next_event() {
            controller.on_order_event(&event, broker);
            progressed = true;
        }
        if broker.take_flat_confirmation() {
            controller.on_position_flat(broker);
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
}

fn snapshot(bar_index: usize, bar: &Bar, broker: &SimBroker) -> EquityPoint {
    EquityPoint {
        bar_index,
        timestamp: bar.timestamp,
        equity: broker.equity(),
        cash: broker.cash(),
        position: broker.position().quantity,
    }
}
