//! Error taxonomy for the evaluation cycle.
//!
//! Isolation boundaries follow the kinds:
//! - `DataUnavailable`, `OrderRejected`, `OrderTimeout` are per-symbol and never
//!   abort the rest of an account's cycle.
//! - `AccountUnavailable` aborts one account's cycle only.
//! - `ConfigInvalid` is fatal at startup.

use thiserror::Error;

/// Invalid or missing configuration threshold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required config field `{0}`")]
    Missing(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure kinds surfaced by a cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradingError {
    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("account {account} unavailable: {reason}")]
    AccountUnavailable { account: String, reason: String },

    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("order for {symbol} not filled after {attempts} attempt(s)")]
    OrderTimeout { symbol: String, attempts: u32 },

    #[error("config invalid: {0}")]
    ConfigInvalid(#[from] ConfigError),
}

impl TradingError {
    /// True for errors that are contained to a single symbol.
    pub fn is_symbol_scoped(&self) -> bool {
        matches!(
            self,
            TradingError::DataUnavailable { .. }
                | TradingError::OrderRejected { .. }
                | TradingError::OrderTimeout { .. }
        )
    }

    /// Short machine-readable kind, used in audit notes and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TradingError::DataUnavailable { .. } => "data_unavailable",
            TradingError::AccountUnavailable { .. } => "account_unavailable",
            TradingError::OrderRejected { .. } => "order_rejected",
            TradingError::OrderTimeout { .. } => "order_timeout",
            TradingError::ConfigInvalid(_) => "config_invalid",
        }
    }
}
