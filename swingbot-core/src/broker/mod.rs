//! Brokerage collaborator interface.
//!
//! The decision engine never talks to a wire protocol directly. Everything it
//! needs from a brokerage (balances, positions, bars, quotes, order entry)
//! goes through [`Broker`], so the REST client is swappable and tests run
//! against [`PaperBroker`].

pub mod paper;

pub use paper::{FillMode, PaperBroker};

use thiserror::Error;

use crate::domain::{
    AccountSnapshot, Bar, OrderId, OrderRequest, OrderResult, PositionSnapshot, Quote, Timeframe,
};

/// Failure reported by the brokerage collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("rejected: {reason}")]
    Rejected { reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("broker error: {0}")]
    Other(String),
}

impl BrokerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Blocking brokerage operations consumed by the cycle.
///
/// Implementations must be shareable across threads; every method takes
/// `&self`.
pub trait Broker: Send + Sync {
    fn get_account(&self) -> Result<AccountSnapshot, BrokerError>;

    fn list_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError>;

    /// Up to `limit` most recent bars, ascending by timestamp.
    fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError>;

    fn get_latest_quote(&self, symbol: &str) -> Result<Quote, BrokerError>;

    fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, BrokerError>;

    fn get_order(&self, order_id: &OrderId) -> Result<OrderResult, BrokerError>;

    fn cancel_order(&self, order_id: &OrderId) -> Result<(), BrokerError>;

    /// Cancel every open order. Returns how many were canceled.
    fn cancel_all_orders(&self) -> Result<usize, BrokerError>;

    /// Flatten every position at market.
    fn close_all_positions(&self) -> Result<Vec<OrderResult>, BrokerError>;
}
