//! Simple moving average.

use super::Indicator;
use crate::domain::Bar;

/// Trailing arithmetic mean over `period` values. Also the smoothing used
/// by [`super::Atr`].
#[derive(Debug, Clone, Copy)]
pub struct Sma {
    period: usize,
}

impl Sma {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Mean of each trailing window of `values`, aligned to the input.
    /// The first `period - 1` slots are NaN, and so is any window that
    /// holds a NaN.
    pub fn series(&self, values: &[f64]) -> Vec<f64> {
        let p = self.period;
        let mut out = vec![f64::NAN; values.len().min(p - 1)];
        out.extend(values.windows(p).map(|w| w.iter().sum::<f64>() / p as f64));
        out
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.series(&closes)
    }
}
