//! RiskGate: vetoes entries and forces exits.
//!
//! The gate itself is stateless configuration. Everything that must survive
//! from one cycle to the next lives in [`RiskState`], which the caller owns
//! and passes in.

pub mod state;
pub mod window;

pub use state::RiskState;
pub use window::TradingWindow;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::domain::{AccountSnapshot, PositionSnapshot, Quote};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Close a held position once it is down this fraction from entry.
    pub stop_loss_pct: f64,
    /// Close a held position once it is up this fraction from entry.
    pub take_profit_pct: f64,
    /// Close once price falls this fraction from its high while held.
    pub trailing_stop_pct: Option<f64>,
    pub daily_profit_target_pct: Option<f64>,
    pub daily_loss_limit_pct: Option<f64>,
    pub cooldown_minutes: i64,
    /// Minimum last-bar volume for an entry. 0 disables the check.
    pub min_volume: f64,
    /// Per-symbol minimum volume, overriding `min_volume`.
    pub min_volume_overrides: BTreeMap<String, f64>,
    /// Maximum (ask - bid) / mid for an entry.
    pub max_spread_pct: Option<f64>,
    pub window: TradingWindow,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.05,
            take_profit_pct: 0.08,
            trailing_stop_pct: None,
            daily_profit_target_pct: None,
            daily_loss_limit_pct: None,
            cooldown_minutes: 60,
            min_volume: 0.0,
            min_volume_overrides: BTreeMap::new(),
            max_spread_pct: None,
            window: TradingWindow::default(),
        }
    }
}

/// Ten years.
pub const MAX_COOLDOWN_MINUTES: i64 = 10 * 365 * 24 * 60;

impl RiskConfig {
    /// Clamped to [`MAX_COOLDOWN_MINUTES`] for configs that skipped validation.
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes.clamp(0, MAX_COOLDOWN_MINUTES))
    }

    pub fn min_volume_for(&self, symbol: &str) -> f64 {
        self.min_volume_overrides
            .get(symbol)
            .copied()
            .unwrap_or(self.min_volume)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pct_ok = |v: f64| v > 0.0 && v <= 1.0;
        if !pct_ok(self.stop_loss_pct) {
            return Err(ConfigError::invalid("risk.stop_loss_pct", "not in (0, 1]"));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct.is_finite()) {
            return Err(ConfigError::invalid("risk.take_profit_pct", "must be > 0"));
        }
        for (field, value) in [
            ("risk.trailing_stop_pct", self.trailing_stop_pct),
            ("risk.daily_profit_target_pct", self.daily_profit_target_pct),
            ("risk.daily_loss_limit_pct", self.daily_loss_limit_pct),
            ("risk.max_spread_pct", self.max_spread_pct),
        ] {
            if let Some(v) = value {
                if !pct_ok(v) {
                    return Err(ConfigError::invalid(field, format!("{v} not in (0, 1]")));
                }
            }
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&self.cooldown_minutes) {
            return Err(ConfigError::invalid(
                "risk.cooldown_minutes",
                format!("must be in [0, {MAX_COOLDOWN_MINUTES}]"),
            ));
        }
        if self.min_volume < 0.0 || self.min_volume_overrides.values().any(|v| *v < 0.0) {
            return Err(ConfigError::invalid("risk.min_volume", "must be >= 0"));
        }
        self.window.validate()
    }
}

/// Why a held position must be closed now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss { pct_change: f64 },
    TakeProfit { pct_change: f64 },
    TrailingStop { high: f64, drawdown: f64 },
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss { pct_change } => {
                write!(f, "stop-loss hit ({:.2}%)", pct_change * 100.0)
            }
            ExitReason::TakeProfit { pct_change } => {
                write!(f, "take-profit hit ({:.2}%)", pct_change * 100.0)
            }
            ExitReason::TrailingStop { high, drawdown } => write!(
                f,
                "trailing stop hit ({:.2}% off high {high:.4})",
                drawdown * 100.0
            ),
        }
    }
}

/// Daily P&L breach that halts the account for the rest of the day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakerTrip {
    ProfitTarget { pnl_pct: f64 },
    LossLimit { pnl_pct: f64 },
}

impl fmt::Display for BreakerTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerTrip::ProfitTarget { pnl_pct } => {
                write!(f, "daily profit target reached ({:.2}%)", pnl_pct * 100.0)
            }
            BreakerTrip::LossLimit { pnl_pct } => {
                write!(f, "daily loss limit breached ({:.2}%)", pnl_pct * 100.0)
            }
        }
    }
}

/// Reasons an entry was vetoed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryRejection {
    #[error("trading halted for the day")]
    Halted,

    #[error("outside trading window")]
    OutsideWindow,

    #[error("cooldown until {until}")]
    Cooldown { until: DateTime<Utc> },

    #[error("volume {volume} below minimum {min}")]
    LowVolume { volume: f64, min: f64 },

    #[error("spread {spread_pct:.4} above maximum {max:.4}")]
    WideSpread { spread_pct: f64, max: f64 },

    #[error("quote unavailable for spread check")]
    QuoteUnavailable,
}

/// Market facts the entry checks look at.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub symbol: &'a str,
    pub now: DateTime<Utc>,
    /// Volume of the most recent bar.
    pub last_volume: Option<f64>,
    pub quote: Option<Quote>,
}

#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// New entries are allowed only inside the window. Signals are still
    /// evaluated outside it.
    pub fn entry_window_open(&self, now: DateTime<Utc>) -> bool {
        self.config.window.is_open(now)
    }

    /// Stop-loss, take-profit and trailing-stop checks for a held long.
    ///
    /// Raises the trailing high-water mark as a side effect. Independent of
    /// the current signal.
    pub fn check_exit(
        &self,
        position: &PositionSnapshot,
        price: f64,
        state: &mut RiskState,
    ) -> Option<ExitReason> {
        if !position.is_long() || !(price.is_finite() && price > 0.0) {
            return None;
        }

        if let Some(pct_change) = position.pct_change_at(price) {
            if pct_change <= -self.config.stop_loss_pct {
                return Some(ExitReason::StopLoss { pct_change });
            }
            if pct_change >= self.config.take_profit_pct {
                return Some(ExitReason::TakeProfit { pct_change });
            }
        }

        if let Some(trail) = self.config.trailing_stop_pct {
            let high = state.update_trailing(&position.symbol, price);
            let drawdown = (high - price) / high;
            if high > 0.0 && drawdown >= trail {
                return Some(ExitReason::TrailingStop { high, drawdown });
            }
        }
        None
    }

    /// Compare equity with the prior close against the daily thresholds.
    pub fn check_circuit_breaker(&self, account: &AccountSnapshot) -> Option<BreakerTrip> {
        let pnl_pct = account.daily_pnl_pct()?;
        if let Some(target) = self.config.daily_profit_target_pct {
            if pnl_pct >= target {
                return Some(BreakerTrip::ProfitTarget { pnl_pct });
            }
        }
        if let Some(limit) = self.config.daily_loss_limit_pct {
            if pnl_pct <= -limit {
                return Some(BreakerTrip::LossLimit { pnl_pct });
            }
        }
        None
    }

    /// Every veto an entry must clear, in order: halt, window, cooldown,
    /// liquidity, spread.
    pub fn check_entry(
        &self,
        ctx: &EntryContext<'_>,
        state: &RiskState,
    ) -> Result<(), EntryRejection> {
        let cfg = &self.config;
        if state.is_halted(cfg.window.local_date(ctx.now)) {
            return Err(EntryRejection::Halted);
        }
        if !self.entry_window_open(ctx.now) {
            return Err(EntryRejection::OutsideWindow);
        }
        if let Some(until) = state.cooldown_until(ctx.symbol, ctx.now, cfg.cooldown()) {
            return Err(EntryRejection::Cooldown { until });
        }

        let min = cfg.min_volume_for(ctx.symbol);
        if min > 0.0 {
            let volume = ctx.last_volume.filter(|v| v.is_finite()).unwrap_or(0.0);
            if volume < min {
                return Err(EntryRejection::LowVolume { volume, min });
            }
        }

        if let Some(max) = cfg.max_spread_pct {
            let spread_pct = ctx
                .quote
                .and_then(|q| q.spread_pct())
                .ok_or(EntryRejection::QuoteUnavailable)?;
            if spread_pct > max {
                return Err(EntryRejection::WideSpread { spread_pct, max });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open_time() -> DateTime<Utc> {
        // Tuesday, 10:00 local at UTC-05:00
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn position(entry: f64, current: f64) -> PositionSnapshot {
        PositionSnapshot {
            symbol: "AAPL".into(),
            qty: 10.0,
            avg_entry_price: entry,
            current_price: current,
            unrealized_plpc: 0.0,
        }
    }

    fn ctx(symbol: &str) -> EntryContext<'_> {
        EntryContext {
            symbol,
            now: open_time(),
            last_volume: Some(10_000.0),
            quote: Some(Quote {
                bid: 99.95,
                ask: 100.05,
            }),
        }
    }

    #[test]
    fn cooldown_minutes_are_bounded() {
        let ok = RiskConfig {
            cooldown_minutes: MAX_COOLDOWN_MINUTES,
            ..RiskConfig::default()
        };
        assert!(ok.validate().is_ok());

        for bad in [-1, MAX_COOLDOWN_MINUTES + 1, 1_000_000_000_000] {
            let cfg = RiskConfig {
                cooldown_minutes: bad,
                ..RiskConfig::default()
            };
            match cfg.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "risk.cooldown_minutes"),
                other => panic!("expected invalid cooldown for {bad}, got {other:?}"),
            }
            assert_eq!(cfg.cooldown().num_minutes(), bad.clamp(0, MAX_COOLDOWN_MINUTES));
        }
    }

    #[test]
    fn stop_loss_forces_exit() {
        let gate = RiskGate::new(RiskConfig::default());
        let mut state = RiskState::new();
        let exit = gate.check_exit(&position(100.0, 94.0), 94.0, &mut state);
        assert!(matches!(exit, Some(ExitReason::StopLoss { pct_change }) if (pct_change + 0.06).abs() < 1e-12));
    }

    #[test]
    fn take_profit_forces_exit() {
        let gate = RiskGate::new(RiskConfig::default());
        let mut state = RiskState::new();
        let exit = gate.check_exit(&position(100.0, 108.5), 108.5, &mut state);
        assert!(matches!(exit, Some(ExitReason::TakeProfit { .. })));
    }

    #[test]
    fn inside_band_no_exit() {
        let gate = RiskGate::new(RiskConfig::default());
        let mut state = RiskState::new();
        assert!(gate.check_exit(&position(100.0, 97.0), 97.0, &mut state).is_none());
    }

    #[test]
    fn trailing_stop_uses_high_water_mark() {
        let gate = RiskGate::new(RiskConfig {
            trailing_stop_pct: Some(0.03),
            ..RiskConfig::default()
        });
        let mut state = RiskState::new();
        let pos = position(100.0, 100.0);
        assert!(gate.check_exit(&pos, 106.0, &mut state).is_none());
        assert!(gate.check_exit(&pos, 104.0, &mut state).is_none());
        let exit = gate.check_exit(&pos, 102.5, &mut state);
        assert!(matches!(exit, Some(ExitReason::TrailingStop { high, .. }) if high == 106.0));
    }

    #[test]
    fn circuit_breaker_thresholds() {
        let gate = RiskGate::new(RiskConfig {
            daily_profit_target_pct: Some(0.03),
            daily_loss_limit_pct: Some(0.02),
            ..RiskConfig::default()
        });
        let acct = |equity: f64| AccountSnapshot {
            equity,
            cash: 0.0,
            buying_power: 0.0,
            last_equity: 100_000.0,
        };
        assert!(gate.check_circuit_breaker(&acct(101_000.0)).is_none());
        assert!(matches!(
            gate.check_circuit_breaker(&acct(103_500.0)),
            Some(BreakerTrip::ProfitTarget { .. })
        ));
        assert!(matches!(
            gate.check_circuit_breaker(&acct(97_000.0)),
            Some(BreakerTrip::LossLimit { .. })
        ));
        // Unconfigured breaker never trips.
        let off = RiskGate::new(RiskConfig::default());
        assert!(off.check_circuit_breaker(&acct(50_000.0)).is_none());
    }

    #[test]
    fn entry_vetoes_in_order() {
        let gate = RiskGate::new(RiskConfig {
            min_volume: 5_000.0,
            max_spread_pct: Some(0.005),
            ..RiskConfig::default()
        });
        let mut state = RiskState::new();
        assert_eq!(gate.check_entry(&ctx("AAPL"), &state), Ok(()));

        let mut closed = ctx("AAPL");
        closed.now = Utc.with_ymd_and_hms(2024, 1, 2, 22, 0, 0).unwrap();
        assert_eq!(gate.check_entry(&closed, &state), Err(EntryRejection::OutsideWindow));

        let mut thin = ctx("AAPL");
        thin.last_volume = Some(100.0);
        assert!(matches!(gate.check_entry(&thin, &state), Err(EntryRejection::LowVolume { .. })));

        let mut wide = ctx("AAPL");
        wide.quote = Some(Quote { bid: 99.0, ask: 101.0 });
        assert!(matches!(gate.check_entry(&wide, &state), Err(EntryRejection::WideSpread { .. })));

        let mut no_quote = ctx("AAPL");
        no_quote.quote = None;
        assert_eq!(gate.check_entry(&no_quote, &state), Err(EntryRejection::QuoteUnavailable));

        state.record_close("AAPL", open_time() - Duration::minutes(10));
        assert!(matches!(gate.check_entry(&ctx("AAPL"), &state), Err(EntryRejection::Cooldown { .. })));
        assert_eq!(gate.check_entry(&ctx("MSFT"), &state), Ok(()));

        state.halt_for_day(gate.config().window.local_date(open_time()));
        assert_eq!(gate.check_entry(&ctx("MSFT"), &state), Err(EntryRejection::Halted));
    }

    #[test]
    fn per_symbol_volume_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert("TSLA".to_string(), 50_000.0);
        let gate = RiskGate::new(RiskConfig {
            min_volume: 1_000.0,
            min_volume_overrides: overrides,
            ..RiskConfig::default()
        });
        let state = RiskState::new();
        assert_eq!(gate.check_entry(&ctx("AAPL"), &state), Ok(()));
        assert!(gate.check_entry(&ctx("TSLA"), &state).is_err());
    }
}
