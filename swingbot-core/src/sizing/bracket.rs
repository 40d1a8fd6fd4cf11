//! Stop-loss / take-profit price derivation for entry brackets.

use super::{SizingConfig, SizingMethod};
use crate::domain::Bracket;

/// Round a price to 4 decimal places, the tick precision brackets use.
pub fn round_price(price: f64) -> f64 {
    (price * 10_000.0).round() / 10_000.0
}

/// Bracket for a long entry at `price`.
///
/// Risk-based sizing puts the stop `atr * atr_multiplier` below the price;
/// percent-of-equity sizing puts it `stop_loss_pct` below. Take-profit is
/// `price * (1 + take_profit_pct)` either way.
///
/// Returns `None` when the stop cannot be placed strictly between zero and
/// the price (no ATR, or ATR wider than the price).
pub fn bracket_prices(price: f64, atr: Option<f64>, cfg: &SizingConfig) -> Option<Bracket> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let stop = match cfg.method {
        SizingMethod::RiskBased => {
            let atr = atr.filter(|a| a.is_finite() && *a > 0.0)?;
            round_price(price - atr * cfg.atr_multiplier)
        }
        SizingMethod::PercentOfEquity => round_price(price * (1.0 - cfg.stop_loss_pct)),
    };
    if stop <= 0.0 || stop >= price {
        return None;
    }
    let take_profit = round_price(price * (1.0 + cfg.take_profit_pct));
    let bracket = Bracket {
        stop_price: stop,
        take_profit_price: take_profit,
    };
    bracket.is_valid_for(crate::domain::OrderSide::Buy, price).then_some(bracket)
}
