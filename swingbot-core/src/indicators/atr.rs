//! Average True Range: the simple mean of true range over `period` bars.
//!
//! Only feeds the stop distance, so there is no recursive smoothing. The
//! first bar has no previous close; its range is left out and the first
//! value lands on bar `period`.

use super::{Indicator, Sma};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy)]
pub struct Atr {
    period: usize,
}

impl Atr {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

/// Per-bar true range against the previous close. Slot 0 is NaN.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    std::iter::once(f64::NAN)
        .chain(bars.windows(2).map(|pair| {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        }))
        .take(bars.len())
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "atr"
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        Sma::new(self.period).series(&true_range(bars))
    }
}
