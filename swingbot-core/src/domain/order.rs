//! Order requests, broker order results, and the order status lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// +1 for buys, -1 for sells. Direction in which a limit must move to
    /// become more marketable.
    pub fn sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    #[default]
    Day,
    Gtc,
    Ioc,
}

/// Share count or dollar amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderQuantity {
    Shares(f64),
    Notional(f64),
}

impl OrderQuantity {
    /// True for a zero or negative amount, which means "do not trade".
    pub fn is_empty(&self) -> bool {
        match self {
            OrderQuantity::Shares(q) => *q <= 0.0,
            OrderQuantity::Notional(n) => *n <= 0.0,
        }
    }

    /// Approximate dollar value at `price`.
    pub fn value_at(&self, price: f64) -> f64 {
        match self {
            OrderQuantity::Shares(q) => q * price,
            OrderQuantity::Notional(n) => *n,
        }
    }

    pub fn shares(&self) -> Option<f64> {
        match self {
            OrderQuantity::Shares(q) => Some(*q),
            OrderQuantity::Notional(_) => None,
        }
    }
}

/// Stop-loss and take-profit legs attached to a parent order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub stop_price: f64,
    pub take_profit_price: f64,
}

impl Bracket {
    /// For a buy: stop < price < take_profit. For a sell: the mirror image.
    pub fn is_valid_for(&self, side: OrderSide, price: f64) -> bool {
        match side {
            OrderSide::Buy => self.stop_price < price && price < self.take_profit_price,
            OrderSide::Sell => self.take_profit_price < price && price < self.stop_price,
        }
    }
}

/// Everything the brokerage collaborator needs to place one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: OrderQuantity,
    pub order_type: OrderKind,
    pub time_in_force: TimeInForce,
    pub limit_price: Option<f64>,
    pub bracket: Option<Bracket>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: OrderQuantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderKind::Market,
            time_in_force: TimeInForce::Day,
            limit_price: None,
            bracket: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: OrderQuantity,
        limit_price: f64,
    ) -> Self {
        Self {
            order_type: OrderKind::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_bracket(mut self, bracket: Option<Bracket>) -> Self {
        self.bracket = bracket;
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

/// Order lifecycle: `Submitted -> {Filled, PartiallyFilled, Canceled, Rejected}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

/// Broker view of an order after submission or a status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub filled_avg_price: Option<f64>,
}

impl OrderResult {
    /// Filled, or partially filled with a positive quantity.
    pub fn has_fill(&self) -> bool {
        match self.status {
            OrderStatus::Filled => true,
            OrderStatus::PartiallyFilled => self.filled_qty > 0.0,
            _ => false,
        }
    }
}
