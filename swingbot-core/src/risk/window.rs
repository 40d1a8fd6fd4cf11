//! Trading-window gate: time-of-day interval in exchange-local time on
//! trading-calendar days.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Entry window, evaluated at a fixed UTC offset.
///
/// Defaults to US regular hours: 09:30 to 16:00 at UTC-05:00, Monday to
/// Friday. The end is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub utc_offset_minutes: i32,
    pub weekdays_only: bool,
    /// Exchange-local dates with no session.
    pub holidays: Vec<NaiveDate>,
}

impl Default for TradingWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            utc_offset_minutes: -300,
            weekdays_only: true,
            holidays: Vec::new(),
        }
    }
}

impl TradingWindow {
    /// Wide-open window: every minute of every day.
    pub fn always() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
            utc_offset_minutes: 0,
            weekdays_only: false,
            holidays: Vec::new(),
        }
    }

    fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }

    /// Exchange-local calendar date of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self.offset() {
            Some(off) => now.with_timezone(&off).date_naive(),
            None => now.date_naive(),
        }
    }

    /// True on a trading-calendar day.
    pub fn is_trading_day(&self, now: DateTime<Utc>) -> bool {
        let date = self.local_date(now);
        if self.weekdays_only && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.holidays.contains(&date)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let Some(off) = self.offset() else {
            return false;
        };
        if !self.is_trading_day(now) {
            return false;
        }
        let t = now.with_timezone(&off).time();
        self.start <= t && t < self.end
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start >= self.end {
            return Err(ConfigError::invalid(
                "risk.window.start",
                format!("{} must be before end {}", self.start, self.end),
            ));
        }
        if self.offset().is_none() {
            return Err(ConfigError::invalid(
                "risk.window.utc_offset_minutes",
                format!("{} out of range", self.utc_offset_minutes),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn regular_hours_at_fixed_offset() {
        let w = TradingWindow::default();
        // Tuesday 2024-01-02. 14:30 UTC = 09:30 local.
        assert!(w.is_open(utc(2024, 1, 2, 14, 30)));
        assert!(w.is_open(utc(2024, 1, 2, 20, 59)));
        assert!(!w.is_open(utc(2024, 1, 2, 14, 29)));
        // 21:00 UTC = 16:00 local, end is exclusive.
        assert!(!w.is_open(utc(2024, 1, 2, 21, 0)));
    }

    #[test]
    fn weekend_closed() {
        let w = TradingWindow::default();
        // Saturday 2024-01-06
        assert!(!w.is_open(utc(2024, 1, 6, 15, 0)));
        assert!(!w.is_trading_day(utc(2024, 1, 6, 15, 0)));
    }

    #[test]
    fn local_date_crosses_midnight() {
        let w = TradingWindow::default();
        // 03:00 UTC Saturday is still Friday evening locally.
        let now = utc(2024, 1, 6, 3, 0);
        assert_eq!(w.local_date(now), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(w.is_trading_day(now));
        assert!(!w.is_open(now));
    }

    #[test]
    fn holidays_closed() {
        let w = TradingWindow {
            holidays: vec![NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()],
            ..TradingWindow::default()
        };
        assert!(!w.is_open(utc(2024, 7, 4, 15, 0)));
        assert!(w.is_open(utc(2024, 7, 5, 15, 0)));
    }

    #[test]
    fn validation() {
        assert!(TradingWindow::default().validate().is_ok());
        let inverted = TradingWindow {
            start: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            ..TradingWindow::default()
        };
        assert!(inverted.validate().is_err());
        let bad_offset = TradingWindow {
            utc_offset_minutes: 24 * 60,
            ..TradingWindow::default()
        };
        assert!(bad_offset.validate().is_err());
    }

    #[test]
    fn window_from_toml_like_json() {
        let w: TradingWindow =
            serde_json::from_str(r#"{"start":"10:00:00","holidays":["2024-12-25"]}"#).unwrap();
        assert_eq!(w.start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(w.utc_offset_minutes, -300);
        assert_eq!(w.holidays.len(), 1);
    }
}
