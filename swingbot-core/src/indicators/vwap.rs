//! Volume-Weighted Average Price (VWAP).
//!
//! Cumulative Σ(typical_price × volume) / Σ(volume) from the first bar of the
//! supplied window. The caller decides where the window starts, so this is
//! not necessarily session-anchored.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Default)]
pub struct Vwap;

impl Vwap {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        let mut pv = 0.0;
        let mut vol = 0.0;

        for (i, bar) in bars.iter().enumerate() {
            if bar.is_void() {
                // A void bar poisons every cumulative value after it.
                return result;
            }
            pv += bar.typical_price() * bar.volume;
            vol += bar.volume;
            if vol > 0.0 {
                result[i] = pv / vol;
            }
        }

        result
    }
}
