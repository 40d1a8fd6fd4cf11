//! IndicatorSet: the read-only snapshot the signal layer consumes.

use serde::{Deserialize, Serialize};

use super::{trend_slope, Atr, Indicator, Rsi, Sma, Vwap};
use crate::domain::Bar;

/// Series the trend slope is fitted against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSource {
    #[default]
    Close,
    SlowSma,
}

/// Window lengths for every indicator in the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub trend_window: usize,
    pub trend_source: TrendSource,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_fast: 5,
            sma_slow: 13,
            rsi_period: 9,
            atr_period: 14,
            trend_window: 50,
            trend_source: TrendSource::Close,
        }
    }
}

impl IndicatorConfig {
    /// Bars needed before the signal layer will act:
    /// `max(slow, rsi, trend) + 2` (one for the previous bar of a cross, one
    /// for the first price change).
    pub fn min_bars(&self) -> usize {
        self.sma_slow.max(self.rsi_period).max(self.trend_window) + 2
    }
}

/// Latest indicator values over a bar window. NaN means "not available".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma_fast: f64,
    pub sma_slow: f64,
    /// Values on the bar before the latest one, for cross detection.
    pub sma_fast_prev: f64,
    pub sma_slow_prev: f64,
    pub rsi: f64,
    pub atr: f64,
    pub vwap: f64,
    pub trend_slope: f64,
    pub last_close: f64,
    pub bar_count: usize,
}

impl IndicatorSet {
    /// Compute every indicator over `bars`. Pure: the same slice always
    /// produces a bit-identical set.
    pub fn compute(bars: &[Bar], cfg: &IndicatorConfig) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = Sma::new(cfg.sma_fast).series(&closes);
        let slow = Sma::new(cfg.sma_slow).series(&closes);

        let rsi = Rsi::new(cfg.rsi_period).latest(bars);
        let atr = Atr::new(cfg.atr_period).latest(bars);
        let vwap = Vwap::new().latest(bars);

        let slope = match cfg.trend_source {
            TrendSource::Close => trend_slope(&closes, cfg.trend_window),
            TrendSource::SlowSma => trend_slope(&slow, cfg.trend_window),
        };

        Self {
            sma_fast: nth_from_end(&fast, 0),
            sma_slow: nth_from_end(&slow, 0),
            sma_fast_prev: nth_from_end(&fast, 1),
            sma_slow_prev: nth_from_end(&slow, 1),
            rsi,
            atr,
            vwap,
            trend_slope: slope,
            last_close: nth_from_end(&closes, 0),
            bar_count: bars.len(),
        }
    }

    /// True when every value the cross-based evaluator compares is finite.
    pub fn is_valid(&self) -> bool {
        [
            self.sma_fast,
            self.sma_slow,
            self.sma_fast_prev,
            self.sma_slow_prev,
            self.rsi,
            self.trend_slope,
            self.last_close,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    /// ATR when it is usable as a stop distance.
    pub fn atr(&self) -> Option<f64> {
        (self.atr.is_finite() && self.atr > 0.0).then_some(self.atr)
    }

    pub fn crossed_up(&self) -> bool {
        self.sma_fast_prev <= self.sma_slow_prev && self.sma_fast > self.sma_slow
    }

    pub fn crossed_down(&self) -> bool {
        self.sma_fast_prev >= self.sma_slow_prev && self.sma_fast < self.sma_slow
    }
}

fn nth_from_end(series: &[f64], n: usize) -> f64 {
    series
        .len()
        .checked_sub(n + 1)
        .and_then(|i| series.get(i).copied())
        .unwrap_or(f64::NAN)
}
