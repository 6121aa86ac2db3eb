//! RevertLab Core: domain types, oscillator, trade lifecycle controller, and
//! the simulated execution engine.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, order requests, roles, fills, notifications, positions, trades)
//! - Money Flow Index oscillator behind an `Oscillator` trait
//! - Trade lifecycle controller: entry, one scale-in, take-profit/stop-loss, same-bar race guard
//! - Order book state machine and simulated broker with intrabar path inference
//! - Bar-by-bar event loop with five phases per bar

pub mod domain;
pub mod engine;
pub mod indicators;
pub mod strategy;
