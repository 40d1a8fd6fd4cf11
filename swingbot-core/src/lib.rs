//! Swingbot Core: the per-symbol decision engine.
//!
//! Leaf to root:
//! - Domain types (bars, account/position snapshots, orders)
//! - IndicatorEngine: SMA, RSI, ATR, VWAP, trend slope
//! - SignalEvaluator: Buy / Sell / Hold with a reason
//! - PositionSizer: bounded share or notional quantity plus bracket
//! - RiskGate: trading window, forced exits, circuit breaker, cooldown
//! - OrderExecutionController: submit, poll, re-price, fall back to market
//!
//! The brokerage is an external collaborator behind the [`broker::Broker`]
//! trait. Nothing in this crate touches the network or the wall clock.

pub mod audit;
pub mod broker;
pub mod domain;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod risk;
pub mod signals;
pub mod sizing;

pub use error::{ConfigError, TradingError};
