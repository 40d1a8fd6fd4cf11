//! IndicatorEngine: pure functions from a bar window to numeric series.
//!
//! Same slice in, bit-identical series out. Slots without enough history
//! hold `f64::NAN`, which the signal layer treats as "hold".

pub mod atr;
pub mod rsi;
pub mod set;
pub mod sma;
pub mod trend;
pub mod vwap;

pub use atr::{true_range, Atr};
pub use rsi::{Rsi, RSI_LOSS_EPSILON};
pub use set::{IndicatorConfig, IndicatorSet, TrendSource};
pub use sma::Sma;
pub use trend::trend_slope;
pub use vwap::Vwap;

use crate::domain::Bar;

/// A series computed over a bar window.
///
/// Output is aligned with the input: one value per bar, the first
/// `lookback()` of them NaN. A value never looks at later bars.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    /// Bars consumed before the first real value.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;

    /// Value on the newest bar, NaN while warming up.
    fn latest(&self, bars: &[Bar]) -> f64 {
        self.compute(bars).last().copied().unwrap_or(f64::NAN)
    }
}

/// Create synthetic hourly bars from close prices for testing.
///
/// open = prev_close (or close for first bar), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
