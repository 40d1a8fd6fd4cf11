//! Majority-vote policy.
//!
//! Three independent confirmations per side:
//! 1. trend: slope in the trade direction, or a cross on the latest bar
//! 2. momentum: RSI inside the buy band (buy) / above overbought (sell)
//! 3. value: last close above VWAP (buy) / below VWAP (sell)
//!
//! A side fires when at least `confirmations_required` agree.

use super::{SignalConfig, SignalDecision};
use crate::indicators::IndicatorSet;

pub fn evaluate(set: &IndicatorSet, cfg: &SignalConfig) -> SignalDecision {
    if !set.vwap.is_finite() {
        return SignalDecision::hold("indicators unavailable");
    }

    let buy = [
        set.trend_slope > 0.0 || set.crossed_up(),
        set.rsi >= cfg.confirmation_rsi_min && set.rsi <= cfg.confirmation_rsi_max,
        set.last_close > set.vwap,
    ];
    let sell = [
        set.trend_slope < 0.0 || set.crossed_down(),
        set.rsi > cfg.rsi_overbought,
        set.last_close < set.vwap,
    ];

    let buy_votes = count(&buy);
    let sell_votes = count(&sell);
    let needed = cfg.confirmations_required;

    if sell_votes >= needed {
        return SignalDecision::sell(format!(
            "{sell_votes}/3 sell confirmations; rsi {:.1}; close {} vwap",
            set.rsi,
            if set.last_close < set.vwap { "below" } else { "at/above" }
        ));
    }
    if buy_votes >= needed {
        return SignalDecision::buy(format!(
            "{buy_votes}/3 buy confirmations; rsi {:.1}; slope {:.6}",
            set.rsi, set.trend_slope
        ));
    }

    SignalDecision::hold(format!("no signal ({buy_votes} buy / {sell_votes} sell)"))
}

fn count(flags: &[bool]) -> usize {
    flags.iter().filter(|&&f| f).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{Signal, SignalPolicy};

    fn cfg() -> SignalConfig {
        SignalConfig {
            policy: SignalPolicy::Confirmation,
            ..SignalConfig::default()
        }
    }

    fn snapshot(slope: f64, rsi: f64, close: f64, vwap: f64) -> IndicatorSet {
        IndicatorSet {
            sma_fast: 10.2,
            sma_slow: 10.0,
            sma_fast_prev: 10.1,
            sma_slow_prev: 10.0,
            rsi,
            atr: 0.5,
            vwap,
            trend_slope: slope,
            last_close: close,
            bar_count: 60,
        }
    }

    #[test]
    fn two_of_three_buys() {
        // Rising trend and close above VWAP; RSI outside the band.
        let d = evaluate(&snapshot(0.02, 20.0, 10.5, 10.0), &cfg());
        assert_eq!(d.signal, Signal::Buy);
        assert!(d.reason.starts_with("2/3"));
    }

    #[test]
    fn one_of_three_holds() {
        let d = evaluate(&snapshot(0.02, 20.0, 9.5, 10.0), &cfg());
        assert_eq!(d.signal, Signal::Hold);
    }

    #[test]
    fn majority_sell() {
        let d = evaluate(&snapshot(-0.02, 50.0, 9.5, 10.0), &cfg());
        assert_eq!(d.signal, Signal::Sell);
    }

    #[test]
    fn sell_precedence_when_both_sides_reach_threshold() {
        let c = SignalConfig {
            confirmations_required: 1,
            ..cfg()
        };
        // Buy: slope up. Sell: close below VWAP.
        let d = evaluate(&snapshot(0.02, 20.0, 9.5, 10.0), &c);
        assert_eq!(d.signal, Signal::Sell);
    }

    #[test]
    fn missing_vwap_holds() {
        let d = evaluate(&snapshot(0.02, 50.0, 10.5, f64::NAN), &cfg());
        assert_eq!(d.signal, Signal::Hold);
        assert_eq!(d.reason, "indicators unavailable");
    }
}
