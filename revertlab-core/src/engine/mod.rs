//! Backtesting engine: simulated broker, order book, and the bar-by-bar loop.
//!
//! The engine consumes validated bars and runs the five-phase bar loop:
//!
//! 1. Start-of-bar: expire good-till orders, fill next-open market orders
//! 2. Intrabar: limit/stop fills in inferred path order
//! 3. Strategy: controller `on_bar`
//! 4. End-of-bar: fill same-bar-close market orders
//! 5. Post-bar: mark-to-market

pub mod execution;
pub mod gateway;
pub mod loop_runner;
pub mod order_book;
pub mod state;
pub mod trade_extraction;

pub use execution::{
    CostModel, ExecutionConfig, FillReporting, GapPolicy, MarketFill, SimBroker,
};
pub use gateway::{CancelOutcome, OrderGateway};
pub use loop_runner::{run_backtest, run_with_controller};
pub use order_book::{OrderBook, OrderBookError};
pub use state::{EquityPoint, RunResult};
pub use trade_extraction::extract_trades;
