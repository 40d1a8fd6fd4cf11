//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV bar. Sequences are ordered by ascending `timestamp` with no duplicates
/// and are never mutated after they are received from the data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLCV field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    /// (high + low + close) / 3, the price VWAP weights by volume.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Checks the ordering contract on a bar window: strictly ascending timestamps.
pub fn is_strictly_ascending(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

/// Bar aggregation interval requested from the data collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1Min")]
    Minute,
    #[serde(rename = "15Min")]
    FifteenMinutes,
    #[default]
    #[serde(rename = "1Hour")]
    Hour,
    #[serde(rename = "1Day")]
    Day,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute => "1Min",
            Timeframe::FifteenMinutes => "15Min",
            Timeframe::Hour => "1Hour",
            Timeframe::Day => "1Day",
        }
    }

    /// Length of one bar.
    pub fn duration(&self) -> chrono::Duration {
        match self {
            Timeframe::Minute => chrono::Duration::minutes(1),
            Timeframe::FifteenMinutes => chrono::Duration::minutes(15),
            Timeframe::Hour => chrono::Duration::hours(1),
            Timeframe::Day => chrono::Duration::days(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
