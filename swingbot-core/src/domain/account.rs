//! Account, position, and quote snapshots read from the brokerage collaborator.
//!
//! All three are point-in-time views. The cycle reads them once at its start
//! and treats them as consistent for its sizing decisions.

use serde::{Deserialize, Serialize};

/// Account balances at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
    /// Equity at the prior session's close. Drives the daily circuit breaker.
    pub last_equity: f64,
}

impl AccountSnapshot {
    /// Daily P&L in dollars relative to the prior close.
    pub fn daily_pnl(&self) -> f64 {
        self.equity - self.last_equity
    }

    /// Daily P&L as a fraction of the prior close (0.02 = +2%).
    ///
    /// Returns `None` when `last_equity` is not positive (new account).
    pub fn daily_pnl_pct(&self) -> Option<f64> {
        if self.last_equity > 0.0 {
            Some(self.daily_pnl() / self.last_equity)
        } else {
            None
        }
    }
}

/// A held position, mirrored locally as a per-cycle read cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    /// Unrealized P&L fraction as reported by the broker.
    #[serde(default)]
    pub unrealized_plpc: f64,
}

impl PositionSnapshot {
    pub fn is_long(&self) -> bool {
        self.qty > 0.0
    }

    pub fn market_value(&self) -> f64 {
        self.qty * self.current_price
    }

    /// (current - entry) / entry, evaluated at `price`.
    ///
    /// Returns `None` for a non-positive entry price.
    pub fn pct_change_at(&self, price: f64) -> Option<f64> {
        if self.avg_entry_price > 0.0 {
            Some((price - self.avg_entry_price) / self.avg_entry_price)
        } else {
            None
        }
    }
}

/// Top-of-book quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn mid(&self) -> Option<f64> {
        if self.bid > 0.0 && self.ask > 0.0 {
            Some((self.bid + self.ask) / 2.0)
        } else {
            None
        }
    }

    /// (ask - bid) / mid. `None` for a one-sided or crossed book.
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid()?;
        if self.ask < self.bid {
            return None;
        }
        Some((self.ask - self.bid) / mid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_pnl_pct_uses_last_equity() {
        let acct = AccountSnapshot {
            equity: 102_000.0,
            cash: 50_000.0,
            buying_power: 100_000.0,
            last_equity: 100_000.0,
        };
        assert_eq!(acct.daily_pnl(), 2_000.0);
        assert!((acct.daily_pnl_pct().unwrap() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn daily_pnl_pct_none_for_new_account() {
        let acct = AccountSnapshot {
            equity: 0.0,
            cash: 0.0,
            buying_power: 0.0,
            last_equity: 0.0,
        };
        assert!(acct.daily_pnl_pct().is_none());
    }

    #[test]
    fn position_pct_change() {
        let pos = PositionSnapshot {
            symbol: "SPY".into(),
            qty: 10.0,
            avg_entry_price: 100.0,
            current_price: 94.0,
            unrealized_plpc: -0.06,
        };
        assert!((pos.pct_change_at(94.0).unwrap() + 0.06).abs() < 1e-12);
        assert_eq!(pos.market_value(), 940.0);
    }

    #[test]
    fn quote_spread() {
        let q = Quote {
            bid: 99.0,
            ask: 101.0,
        };
        assert_eq!(q.mid(), Some(100.0));
        assert!((q.spread_pct().unwrap() - 0.02).abs() < 1e-12);

        let one_sided = Quote { bid: 0.0, ask: 101.0 };
        assert!(one_sided.spread_pct().is_none());
    }
}
