//! Relative Strength Index with Wilder smoothing.
//!
//! The first value appears once `period` close-to-close changes are in and
//! uses their plain averages. Every later change moves each average by
//! 1/period of the distance to it.
//!
//! A zero average loss is floored at [`RSI_LOSS_EPSILON`], so a pure run of
//! gains stays just below 100. A window where nothing moved reads 50.

use super::Indicator;
use crate::domain::Bar;

/// Floor for the average loss in the RS ratio.
pub const RSI_LOSS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct WilderAverages {
    gain: f64,
    loss: f64,
}

impl WilderAverages {
    fn seed(&mut self, gain: f64, loss: f64, period: f64) {
        self.gain += gain / period;
        self.loss += loss / period;
    }

    fn smooth(&mut self, gain: f64, loss: f64, period: f64) {
        self.gain += (gain - self.gain) / period;
        self.loss += (loss - self.loss) / period;
    }

    fn rsi(&self) -> f64 {
        if self.gain == 0.0 && self.loss == 0.0 {
            return 50.0;
        }
        let rs = self.gain / self.loss.max(RSI_LOSS_EPSILON);
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let period = self.period as f64;
        let mut out = vec![f64::NAN; bars.len()];
        let mut avg = WilderAverages::default();

        for (i, pair) in bars.windows(2).enumerate() {
            let change = pair[1].close - pair[0].close;
            if change.is_nan() {
                break;
            }
            let (gain, loss) = (change.max(0.0), (-change).max(0.0));
            let seen = i + 1;
            if seen <= self.period {
                avg.seed(gain, loss, period);
                if seen < self.period {
                    continue;
                }
            } else {
                avg.smooth(gain, loss, period);
            }
            out[seen] = avg.rsi();
        }
        out
    }
}
