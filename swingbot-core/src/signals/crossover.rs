//! Cross-based policy: strict AND to enter, OR to exit.

use super::{SignalConfig, SignalDecision};
use crate::indicators::IndicatorSet;

/// Buy: fast SMA crosses above slow on the latest bar, RSI below oversold,
/// trend slope positive. Sell: fast SMA crosses below slow, or RSI above
/// overbought. Sell is checked first.
pub fn evaluate(set: &IndicatorSet, cfg: &SignalConfig) -> SignalDecision {
    let cross_down = set.crossed_down();
    let overbought = set.rsi > cfg.rsi_overbought;
    if cross_down || overbought {
        let reason = match (cross_down, overbought) {
            (true, true) => format!("sma cross down; rsi high ({:.1})", set.rsi),
            (true, false) => format!("sma cross down; rsi {:.1}", set.rsi),
            _ => format!("rsi high ({:.1})", set.rsi),
        };
        return SignalDecision::sell(reason);
    }

    if set.crossed_up() && set.rsi < cfg.rsi_oversold && set.trend_slope > 0.0 {
        return SignalDecision::buy(format!(
            "sma cross up; rsi {:.1}; slope {:.6}",
            set.rsi, set.trend_slope
        ));
    }

    SignalDecision::hold("no signal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signal;

    fn snapshot(fast_prev: f64, fast: f64, slow: f64, rsi: f64, slope: f64) -> IndicatorSet {
        IndicatorSet {
            sma_fast: fast,
            sma_slow: slow,
            sma_fast_prev: fast_prev,
            sma_slow_prev: slow,
            rsi,
            atr: 1.0,
            vwap: 10.0,
            trend_slope: slope,
            last_close: 10.0,
            bar_count: 60,
        }
    }

    #[test]
    fn cross_up_oversold_uptrend_buys() {
        let cfg = SignalConfig::default();
        let d = evaluate(&snapshot(9.9, 10.1, 10.0, 28.0, 0.01), &cfg);
        assert_eq!(d.signal, Signal::Buy);
        assert!(d.reason.contains("cross up"));
    }

    #[test]
    fn buy_needs_every_condition() {
        let cfg = SignalConfig::default();
        // RSI not oversold
        assert_eq!(evaluate(&snapshot(9.9, 10.1, 10.0, 45.0, 0.01), &cfg).signal, Signal::Hold);
        // Flat trend
        assert_eq!(evaluate(&snapshot(9.9, 10.1, 10.0, 28.0, 0.0), &cfg).signal, Signal::Hold);
        // Already above on the prior bar: no cross
        assert_eq!(evaluate(&snapshot(10.05, 10.1, 10.0, 28.0, 0.01), &cfg).signal, Signal::Hold);
    }

    #[test]
    fn cross_down_sells_regardless_of_rsi() {
        let cfg = SignalConfig::default();
        let d = evaluate(&snapshot(10.1, 9.9, 10.0, 40.0, 0.01), &cfg);
        assert_eq!(d.signal, Signal::Sell);
        assert!(d.reason.contains("cross down"));
    }

    #[test]
    fn overbought_alone_sells() {
        let cfg = SignalConfig::default();
        let d = evaluate(&snapshot(10.2, 10.3, 10.0, 75.0, 0.01), &cfg);
        assert_eq!(d.signal, Signal::Sell);
        assert_eq!(d.reason, "rsi high (75.0)");
    }

    #[test]
    fn sell_wins_over_buy() {
        // Cross up with oversold RSI and rising trend, but thresholds overlap
        // so RSI is also overbought.
        let cfg = SignalConfig {
            rsi_oversold: 60.0,
            rsi_overbought: 50.0,
            ..SignalConfig::default()
        };
        let d = evaluate(&snapshot(9.9, 10.1, 10.0, 55.0, 0.01), &cfg);
        assert_eq!(d.signal, Signal::Sell);
    }
}
