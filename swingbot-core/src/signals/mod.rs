//! SignalEvaluator: turns an indicator snapshot into Buy / Sell / Hold.
//!
//! Evaluation is stateless: the same bar window always yields the same
//! decision. Two policies sit behind the one interface:
//! - `Crossover`: strict AND for entries (cross up, RSI oversold, trend up),
//!   OR for exits (cross down, RSI overbought).
//! - `Confirmation`: majority vote over three independent confirmations.
//!
//! Sell wins whenever both sides qualify.

pub mod confirmation;
pub mod crossover;
pub mod volatility;

pub use volatility::return_volatility;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Bar;
use crate::error::ConfigError;
use crate::indicators::{IndicatorConfig, IndicatorSet};

/// Discrete trade intent for one symbol in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        })
    }
}

/// A signal plus its human-readable justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub signal: Signal,
    pub reason: String,
}

impl SignalDecision {
    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Buy,
            reason: reason.into(),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Sell,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Hold,
            reason: reason.into(),
        }
    }

    pub fn insufficient_data() -> Self {
        Self::hold(INSUFFICIENT_DATA)
    }
}

pub const INSUFFICIENT_DATA: &str = "insufficient data";

/// Which evaluation policy the evaluator runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPolicy {
    #[default]
    Crossover,
    Confirmation,
}

/// Thresholds for signal evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    #[serde(flatten)]
    pub indicators: IndicatorConfig,
    pub policy: SignalPolicy,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Confirmations needed out of three under the `Confirmation` policy.
    pub confirmations_required: usize,
    /// RSI band a buy confirmation accepts under the `Confirmation` policy.
    pub confirmation_rsi_min: f64,
    pub confirmation_rsi_max: f64,
    /// Minimum standard deviation of close-to-close returns. `None` disables
    /// the gate.
    pub min_volatility: Option<f64>,
    pub volatility_lookback: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorConfig::default(),
            policy: SignalPolicy::Crossover,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            confirmations_required: 2,
            confirmation_rsi_min: 30.0,
            confirmation_rsi_max: 70.0,
            min_volatility: None,
            volatility_lookback: 30,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ind = &self.indicators;
        for (field, value) in [
            ("strategy.sma_fast", ind.sma_fast),
            ("strategy.sma_slow", ind.sma_slow),
            ("strategy.rsi_period", ind.rsi_period),
            ("strategy.atr_period", ind.atr_period),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be >= 1"));
            }
        }
        if ind.sma_fast >= ind.sma_slow {
            return Err(ConfigError::invalid(
                "strategy.sma_fast",
                format!("must be < sma_slow ({})", ind.sma_slow),
            ));
        }
        if ind.trend_window < 2 {
            return Err(ConfigError::invalid("strategy.trend_window", "must be >= 2"));
        }
        let rsi_ok = |v: f64| (0.0..=100.0).contains(&v);
        if !rsi_ok(self.rsi_oversold) || !rsi_ok(self.rsi_overbought) {
            return Err(ConfigError::invalid(
                "strategy.rsi_oversold",
                "RSI thresholds must lie in [0, 100]",
            ));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(ConfigError::invalid(
                "strategy.rsi_oversold",
                format!("must be < rsi_overbought ({})", self.rsi_overbought),
            ));
        }
        if !(1..=3).contains(&self.confirmations_required) {
            return Err(ConfigError::invalid(
                "strategy.confirmations_required",
                "must be 1, 2 or 3",
            ));
        }
        if self.confirmation_rsi_min > self.confirmation_rsi_max {
            return Err(ConfigError::invalid(
                "strategy.confirmation_rsi_min",
                "must be <= confirmation_rsi_max",
            ));
        }
        if let Some(v) = self.min_volatility {
            if v.is_nan() || v < 0.0 {
                return Err(ConfigError::invalid("strategy.min_volatility", "must be >= 0"));
            }
            if self.volatility_lookback < 2 {
                return Err(ConfigError::invalid(
                    "strategy.volatility_lookback",
                    "must be >= 2",
                ));
            }
        }
        Ok(())
    }
}

/// Evaluates one symbol's bar window under a fixed configuration.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    config: SignalConfig,
}

impl SignalEvaluator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn evaluate(&self, bars: &[Bar]) -> SignalDecision {
        self.evaluate_with_indicators(bars).0
    }

    /// Evaluate and also hand back the indicator snapshot, which the caller
    /// reuses for ATR stops and the reference price.
    pub fn evaluate_with_indicators(&self, bars: &[Bar]) -> (SignalDecision, IndicatorSet) {
        let set = IndicatorSet::compute(bars, &self.config.indicators);

        if bars.len() < self.config.indicators.min_bars() {
            return (SignalDecision::insufficient_data(), set);
        }

        if let Some(min_vol) = self.config.min_volatility {
            let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
            match return_volatility(&closes, self.config.volatility_lookback) {
                Some(vol) if vol >= min_vol => {}
                Some(vol) => {
                    return (SignalDecision::hold(format!("low volatility ({vol:.6})")), set)
                }
                None => return (SignalDecision::hold("low volatility (unavailable)"), set),
            }
        }

        let decision = self.evaluate_set(&set);
        (decision, set)
    }

    /// Apply the configured policy to a precomputed snapshot.
    ///
    /// Does not check the bar count; `evaluate` does that before calling in.
    pub fn evaluate_set(&self, set: &IndicatorSet) -> SignalDecision {
        if !set.is_valid() {
            return SignalDecision::hold("indicators unavailable");
        }
        match self.config.policy {
            SignalPolicy::Crossover => crossover::evaluate(set, &self.config),
            SignalPolicy::Confirmation => confirmation::evaluate(set, &self.config),
        }
    }
}
