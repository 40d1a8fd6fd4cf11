//! RiskState: the cross-cycle memory of the risk gate.
//!
//! Holds the re-entry cooldown map, the trailing-stop high-water marks and
//! the daily halt flag. Created at process start and passed into every cycle
//! explicitly; serializable so a runner can carry it across invocations.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskState {
    /// symbol -> time of the last close.
    pub last_close: BTreeMap<String, DateTime<Utc>>,
    /// symbol -> highest price observed while the position was held.
    pub trailing_high: BTreeMap<String, f64>,
    /// Exchange-local date on which the circuit breaker tripped.
    pub halted_on: Option<NaiveDate>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the cooldown clock and drop the trailing mark for `symbol`.
    pub fn record_close(&mut self, symbol: &str, at: DateTime<Utc>) {
        self.last_close.insert(symbol.to_string(), at);
        self.trailing_high.remove(symbol);
    }

    /// When the cooldown on `symbol` ends, if it is still running at `now`.
    pub fn cooldown_until(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Option<DateTime<Utc>> {
        let at = self.last_close.get(symbol)?;
        match at.checked_add_signed(cooldown) {
            Some(until) => (now < until).then_some(until),
            None => Some(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn in_cooldown(&self, symbol: &str, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.cooldown_until(symbol, now, cooldown).is_some()
    }

    /// Forget cooldown entries that have elapsed.
    pub fn prune_cooldowns(&mut self, now: DateTime<Utc>, cooldown: Duration) {
        self.last_close
            .retain(|_, at| at.checked_add_signed(cooldown).map_or(true, |until| now < until));
    }

    /// Raise the high-water mark for `symbol` to `price` and return it.
    pub fn update_trailing(&mut self, symbol: &str, price: f64) -> f64 {
        let high = self
            .trailing_high
            .entry(symbol.to_string())
            .or_insert(price);
        if price > *high {
            *high = price;
        }
        *high
    }

    /// Drop marks for symbols no longer held.
    pub fn retain_trailing<F: Fn(&str) -> bool>(&mut self, held: F) {
        self.trailing_high.retain(|s, _| held(s));
    }

    pub fn halt_for_day(&mut self, date: NaiveDate) {
        self.halted_on = Some(date);
    }

    /// A halt only applies to the day it was set.
    pub fn is_halted(&self, date: NaiveDate) -> bool {
        self.halted_on == Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap()
    }

    #[test]
    fn cooldown_lifecycle() {
        let mut s = RiskState::new();
        let cd = Duration::minutes(60);
        assert!(!s.in_cooldown("SPY", t(15, 0), cd));

        s.record_close("SPY", t(15, 0));
        assert!(s.in_cooldown("SPY", t(15, 59), cd));
        assert_eq!(s.cooldown_until("SPY", t(15, 30), cd), Some(t(16, 0)));
        assert!(!s.in_cooldown("SPY", t(16, 0), cd));
        assert!(!s.in_cooldown("QQQ", t(15, 30), cd));

        s.prune_cooldowns(t(16, 1), cd);
        assert!(s.last_close.is_empty());
    }

    #[test]
    fn overflowing_cooldown_never_panics() {
        let mut s = RiskState::new();
        let forever = Duration::days(365 * 300_000);
        s.record_close("SPY", t(15, 0));

        assert_eq!(
            s.cooldown_until("SPY", t(16, 0), forever),
            Some(DateTime::<Utc>::MAX_UTC)
        );
        s.prune_cooldowns(t(16, 0), forever);
        assert!(s.in_cooldown("SPY", t(16, 0), forever));
    }

    #[test]
    fn trailing_high_only_rises() {
        let mut s = RiskState::new();
        assert_eq!(s.update_trailing("AAPL", 100.0), 100.0);
        assert_eq!(s.update_trailing("AAPL", 105.0), 105.0);
        assert_eq!(s.update_trailing("AAPL", 101.0), 105.0);

        s.record_close("AAPL", t(15, 0));
        assert!(s.trailing_high.get("AAPL").is_none());
    }

    #[test]
    fn halt_is_scoped_to_one_day() {
        let mut s = RiskState::new();
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        s.halt_for_day(d);
        assert!(s.is_halted(d));
        assert!(!s.is_halted(d.succ_opt().unwrap()));
    }

    #[test]
    fn json_round_trip() {
        let mut s = RiskState::new();
        s.record_close("SPY", t(15, 0));
        s.update_trailing("QQQ", 400.0);
        let json = serde_json::to_string(&s).unwrap();
        let back: RiskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
