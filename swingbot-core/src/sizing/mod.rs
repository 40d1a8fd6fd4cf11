//! PositionSizer: bounded share quantity (or notional) for a prospective buy.
//!
//! Sizers are portfolio-aware (equity, cash, existing exposure) but
//! signal-agnostic. Every decision honours three ceilings:
//! - position: `current_position_value + qty*price <= max_position_pct * equity`
//! - trade:    `qty*price <= max_trade_pct * equity`
//! - cash:     `qty*price <= cash`
//!
//! A zero quantity means "do not trade".

pub mod bracket;

pub use bracket::{bracket_prices, round_price};

use serde::{Deserialize, Serialize};

use crate::domain::{Bracket, OrderQuantity};
use crate::error::ConfigError;

/// Smallest notional order the fractional fallback will emit.
pub const MIN_NOTIONAL: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// Fixed dollar risk per trade divided by per-share stop distance.
    #[default]
    RiskBased,
    /// Fixed fraction of equity, stop/take-profit as fixed percentages.
    PercentOfEquity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub method: SizingMethod,
    pub risk_per_trade_pct: f64,
    pub max_position_pct: f64,
    pub max_trade_pct: f64,
    /// Emit a notional order when fewer than one whole share fits.
    pub allow_fractional: bool,
    pub atr_multiplier: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::RiskBased,
            risk_per_trade_pct: 0.01,
            max_position_pct: 0.25,
            max_trade_pct: 0.20,
            allow_fractional: false,
            atr_multiplier: 1.5,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.08,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("sizing.risk_per_trade_pct", self.risk_per_trade_pct),
            ("sizing.max_position_pct", self.max_position_pct),
            ("sizing.max_trade_pct", self.max_trade_pct),
            ("sizing.stop_loss_pct", self.stop_loss_pct),
            ("sizing.take_profit_pct", self.take_profit_pct),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::invalid(field, format!("{value} not in (0, 1]")));
            }
        }
        if !(self.atr_multiplier > 0.0 && self.atr_multiplier.is_finite()) {
            return Err(ConfigError::invalid("sizing.atr_multiplier", "must be > 0"));
        }
        Ok(())
    }
}

/// Point-in-time inputs for one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInput {
    pub equity: f64,
    pub cash: f64,
    pub price: f64,
    pub stop_price: f64,
    /// Market value already held in the symbol.
    pub current_position_value: f64,
}

/// The ceiling that set the final quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeLimit {
    Risk,
    Position,
    Trade,
    Cash,
    /// Inputs could not be sized (non-positive equity, price or stop distance).
    Invalid,
}

/// Quantity plus the bracket it was sized against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingDecision {
    pub quantity: OrderQuantity,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub limited_by: SizeLimit,
}

impl SizingDecision {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_empty()
    }

    pub fn bracket(&self) -> Bracket {
        Bracket {
            stop_price: self.stop_price,
            take_profit_price: self.take_profit_price,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Bracket for an entry at `price`; see [`bracket_prices`].
    pub fn bracket_for(&self, price: f64, atr: Option<f64>) -> Option<Bracket> {
        bracket_prices(price, atr, &self.config)
    }

    pub fn size(&self, input: &SizingInput) -> SizingDecision {
        let cfg = &self.config;
        let take_profit_price = round_price(input.price * (1.0 + cfg.take_profit_pct));
        let empty = |limited_by| SizingDecision {
            quantity: OrderQuantity::Shares(0.0),
            stop_price: input.stop_price,
            take_profit_price,
            limited_by,
        };

        let SizingInput {
            equity,
            cash,
            price,
            stop_price,
            current_position_value,
        } = *input;
        if !(equity > 0.0 && price > 0.0 && price.is_finite() && equity.is_finite()) {
            return empty(SizeLimit::Invalid);
        }

        // Dollar ceilings; each is converted to whole shares separately.
        let position_value = (cfg.max_position_pct * equity - current_position_value).max(0.0);
        let trade_value = cfg.max_trade_pct * equity;
        let cash_value = cash.max(0.0);

        let mut candidates = Vec::with_capacity(4);
        if cfg.method == SizingMethod::RiskBased {
            let per_share_risk = price - stop_price;
            if !(per_share_risk > 0.0) {
                return empty(SizeLimit::Invalid);
            }
            let risk_shares = equity * cfg.risk_per_trade_pct / per_share_risk;
            candidates.push((SizeLimit::Risk, risk_shares.floor(), risk_shares * price));
        }
        candidates.push((SizeLimit::Position, (position_value / price).floor(), position_value));
        candidates.push((SizeLimit::Trade, (trade_value / price).floor(), trade_value));
        candidates.push((SizeLimit::Cash, (cash_value / price).floor(), cash_value));

        let (limited_by, qty) = candidates
            .iter()
            .fold((SizeLimit::Invalid, f64::INFINITY), |acc, &(lim, q, _)| {
                if q < acc.1 {
                    (lim, q)
                } else {
                    acc
                }
            });
        let qty = qty.max(0.0);

        if qty >= 1.0 || !cfg.allow_fractional {
            return SizingDecision {
                quantity: OrderQuantity::Shares(qty),
                stop_price,
                take_profit_price,
                limited_by,
            };
        }

        // Fractional fallback: same ceilings, in dollars, rounded down to cents.
        let (limited_by, value) = candidates
            .iter()
            .fold((SizeLimit::Invalid, f64::INFINITY), |acc, &(lim, _, v)| {
                if v < acc.1 {
                    (lim, v)
                } else {
                    acc
                }
            });
        let notional = (value.max(0.0) * 100.0).floor() / 100.0;
        if notional < MIN_NOTIONAL {
            return empty(limited_by);
        }
        SizingDecision {
            quantity: OrderQuantity::Notional(notional),
            stop_price,
            take_profit_price,
            limited_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(equity: f64, price: f64, stop: f64) -> SizingInput {
        SizingInput {
            equity,
            cash: equity,
            price,
            stop_price: stop,
            current_position_value: 0.0,
        }
    }

    #[test]
    fn trade_cap_binds() {
        let sizer = PositionSizer::new(SizingConfig::default());
        let d = sizer.size(&input(100_000.0, 50.0, 48.0));
        assert_eq!(d.quantity, OrderQuantity::Shares(400.0));
        assert_eq!(d.limited_by, SizeLimit::Trade);
        assert_eq!(d.stop_price, 48.0);
        assert_eq!(d.take_profit_price, 54.0);
    }

    #[test]
    fn risk_binds_with_wide_stop() {
        let sizer = PositionSizer::new(SizingConfig::default());
        // risk $1000 / $10 per share = 100 shares; trade cap 400
        let d = sizer.size(&input(100_000.0, 50.0, 40.0));
        assert_eq!(d.quantity, OrderQuantity::Shares(100.0));
        assert_eq!(d.limited_by, SizeLimit::Risk);
    }

    #[test]
    fn existing_exposure_reduces_headroom() {
        let sizer = PositionSizer::new(SizingConfig::default());
        let mut inp = input(100_000.0, 50.0, 48.0);
        inp.current_position_value = 20_000.0;
        let d = sizer.size(&inp);
        // (25000 - 20000) / 50 = 100
        assert_eq!(d.quantity, OrderQuantity::Shares(100.0));
        assert_eq!(d.limited_by, SizeLimit::Position);

        inp.current_position_value = 30_000.0;
        assert!(sizer.size(&inp).is_empty());
    }

    #[test]
    fn cash_binds() {
        let sizer = PositionSizer::new(SizingConfig::default());
        let mut inp = input(100_000.0, 50.0, 48.0);
        inp.cash = 1_234.0;
        let d = sizer.size(&inp);
        assert_eq!(d.quantity, OrderQuantity::Shares(24.0));
        assert_eq!(d.limited_by, SizeLimit::Cash);
    }

    #[test]
    fn stop_at_or_above_price_is_zero() {
        let sizer = PositionSizer::new(SizingConfig::default());
        let d = sizer.size(&input(100_000.0, 50.0, 50.0));
        assert!(d.is_empty());
        assert_eq!(d.limited_by, SizeLimit::Invalid);
    }

    #[test]
    fn non_positive_equity_is_zero() {
        let sizer = PositionSizer::new(SizingConfig::default());
        assert!(sizer.size(&input(0.0, 50.0, 48.0)).is_empty());
        assert!(sizer.size(&input(-5.0, 50.0, 48.0)).is_empty());
    }

    #[test]
    fn percent_of_equity_variant() {
        let sizer = PositionSizer::new(SizingConfig {
            method: SizingMethod::PercentOfEquity,
            ..SizingConfig::default()
        });
        let mut inp = input(10_000.0, 30.0, 28.5);
        inp.current_position_value = 1_000.0;
        // min(2000, 2500-1000) / 30 = 50
        let d = sizer.size(&inp);
        assert_eq!(d.quantity, OrderQuantity::Shares(50.0));
        assert_eq!(d.limited_by, SizeLimit::Position);
    }

    #[test]
    fn fractional_fallback_emits_notional() {
        let sizer = PositionSizer::new(SizingConfig {
            allow_fractional: true,
            ..SizingConfig::default()
        });
        // Trade cap $200 cannot buy one $500 share.
        let d = sizer.size(&input(1_000.0, 500.0, 480.0));
        assert_eq!(d.quantity, OrderQuantity::Notional(200.0));
        assert_eq!(d.limited_by, SizeLimit::Trade);
    }

    #[test]
    fn without_fractional_sub_share_is_zero() {
        let sizer = PositionSizer::new(SizingConfig::default());
        assert!(sizer.size(&input(1_000.0, 500.0, 480.0)).is_empty());
    }

    #[test]
    fn config_rejects_out_of_range_pct() {
        let cfg = SizingConfig {
            max_trade_pct: 1.5,
            ..SizingConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "sizing.max_trade_pct"
        ));
        assert!(SizingConfig::default().validate().is_ok());
    }
}
