//! One evaluation cycle for one account, and the sequential multi-account
//! driver.
//!
//! Per account: read the account and positions once, check the daily
//! circuit breaker, then walk the symbols in list order. Each symbol gets
//! forced-exit checks first, then its signal. Entries go through the risk
//! gate, the sizer and the execution controller.
//!
//! Isolation:
//! - a failed account or positions fetch aborts that account only;
//! - every per-symbol failure is recorded in the report and the loop moves on.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use swingbot_core::audit::{AuditSink, TradeAuditRecord};
use swingbot_core::broker::{Broker, BrokerError};
use swingbot_core::domain::{AccountSnapshot, OrderSide, PositionSnapshot, Quote};
use swingbot_core::execution::{
    ExecutionOutcome, ExecutionStatus, OrderExecutionController, OrderIntent, Sleeper, ThreadSleeper,
};
use swingbot_core::indicators::IndicatorSet;
use swingbot_core::risk::{BreakerTrip, EntryContext, RiskGate, RiskState};
use swingbot_core::signals::{Signal, SignalDecision, SignalEvaluator};
use swingbot_core::sizing::{PositionSizer, SizingInput};
use swingbot_core::TradingError;

use crate::config::{AccountConfig, BotConfig};
use crate::state::StateStore;

/// Error kind and message, kept serializable for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNote {
    pub kind: String,
    pub message: String,
}

impl From<&TradingError> for ErrorNote {
    fn from(err: &TradingError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// What the cycle did about one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SymbolAction {
    None,
    /// A held position was closed, fully or in part.
    Exited {
        reason: String,
        qty: f64,
        avg_fill_price: Option<f64>,
    },
    Entered {
        qty: f64,
        avg_fill_price: Option<f64>,
        stop_price: f64,
        take_profit_price: f64,
        partial: bool,
    },
    /// The signal called for a trade the risk gate did not allow.
    Suppressed { reason: String },
    /// A buy was allowed but sized to nothing.
    Skipped { reason: String },
    /// An order was attempted and nothing filled.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    /// Reference price used this cycle.
    pub price: Option<f64>,
    pub decision: Option<SignalDecision>,
    pub action: SymbolAction,
    pub error: Option<ErrorNote>,
}

impl SymbolReport {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: None,
            decision: None,
            action: SymbolAction::None,
            error: None,
        }
    }

    fn with_action(mut self, action: SymbolAction) -> Self {
        self.action = action;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub account: String,
    pub started_at: DateTime<Utc>,
    pub config_fingerprint: String,
    /// Account as read at the start of the cycle.
    pub snapshot: AccountSnapshot,
    pub window_open: bool,
    pub halted: bool,
    pub breaker: Option<BreakerTrip>,
    pub symbols: Vec<SymbolReport>,
}

impl CycleReport {
    pub fn entries(&self) -> usize {
        self.count(|a| matches!(a, SymbolAction::Entered { .. }))
    }

    pub fn exits(&self) -> usize {
        self.count(|a| matches!(a, SymbolAction::Exited { .. }))
    }

    /// Symbols that ended the cycle with an error.
    pub fn errors(&self) -> usize {
        self.symbols.iter().filter(|s| s.error.is_some()).count()
    }

    fn count(&self, f: impl Fn(&SymbolAction) -> bool) -> usize {
        self.symbols.iter().filter(|s| f(&s.action)).count()
    }
}

/// Run one cycle for `account`, sleeping on the wall clock between polls.
pub fn run_account_cycle(
    account: &AccountConfig,
    broker: &dyn Broker,
    config: &BotConfig,
    state: &mut RiskState,
    sink: &dyn AuditSink,
    now: DateTime<Utc>,
) -> Result<CycleReport, TradingError> {
    run_account_cycle_with(account, broker, config, state, sink, &ThreadSleeper, now)
}

/// [`run_account_cycle`] with an explicit sleeper for fill polling.
pub fn run_account_cycle_with(
    account: &AccountConfig,
    broker: &dyn Broker,
    config: &BotConfig,
    state: &mut RiskState,
    sink: &dyn AuditSink,
    sleeper: &dyn Sleeper,
    now: DateTime<Utc>,
) -> Result<CycleReport, TradingError> {
    let name = account.name.as_str();
    let unavailable = |e: BrokerError| TradingError::AccountUnavailable {
        account: name.to_string(),
        reason: e.to_string(),
    };
    let snapshot = broker.get_account().map_err(unavailable)?;
    let positions = broker.list_positions().map_err(unavailable)?;

    let gate = RiskGate::new(config.risk.clone());
    let today = gate.config().window.local_date(now);
    let window_open = gate.entry_window_open(now);

    let held: BTreeMap<String, PositionSnapshot> = positions
        .into_iter()
        .filter(PositionSnapshot::is_long)
        .map(|p| (p.symbol.clone(), p))
        .collect();
    state.prune_cooldowns(now, gate.config().cooldown());
    state.retain_trailing(|s| held.contains_key(s));

    info!(
        account = name,
        equity = snapshot.equity,
        cash = snapshot.cash,
        positions = held.len(),
        window_open,
        "cycle start"
    );

    let mut cycle = AccountCycle {
        account: name,
        broker,
        config,
        state,
        sink,
        sleeper,
        now,
        evaluator: SignalEvaluator::new(config.strategy.clone()),
        sizer: PositionSizer::new(config.sizing.clone()),
        gate,
        window_open,
        snapshot: snapshot.clone(),
        cash: snapshot.cash,
        held,
    };

    let mut report = CycleReport {
        account: name.to_string(),
        started_at: now,
        config_fingerprint: config.fingerprint(),
        snapshot,
        window_open,
        halted: false,
        breaker: None,
        symbols: Vec::new(),
    };

    if cycle.state.is_halted(today) {
        info!(account = name, "halted for the day, entries suppressed");
        report.halted = true;
    } else if let Some(trip) = cycle.gate.check_circuit_breaker(&cycle.snapshot) {
        cycle.trip_breaker(trip);
        cycle.state.halt_for_day(today);
        report.breaker = Some(trip);
        report.halted = true;
    }

    for symbol in config.symbols_for(account) {
        let symbol_report = match cycle.process_symbol(symbol) {
            Ok(r) => r,
            Err(err) => {
                warn!(account = name, symbol = %symbol, kind = err.kind(), error = %err, "symbol skipped");
                SymbolReport {
                    error: Some(ErrorNote::from(&err)),
                    ..SymbolReport::new(symbol)
                }
            }
        };
        report.symbols.push(symbol_report);
    }

    info!(
        account = name,
        entries = report.entries(),
        exits = report.exits(),
        errors = report.errors(),
        "cycle done"
    );
    Ok(report)
}

/// Outcome of one account in a multi-account run.
#[derive(Debug)]
pub struct AccountRun {
    pub account: String,
    pub result: Result<CycleReport, TradingError>,
}

/// Broker handle for one configured account.
pub struct AccountHandle<'a> {
    pub account: &'a AccountConfig,
    pub broker: &'a dyn Broker,
}

/// Run every account in order. An unavailable account is logged and the
/// run moves on to the next one.
pub fn run_all_accounts(
    handles: &[AccountHandle<'_>],
    config: &BotConfig,
    store: &mut StateStore,
    sink: &dyn AuditSink,
    sleeper: &dyn Sleeper,
    now: DateTime<Utc>,
) -> Vec<AccountRun> {
    handles
        .iter()
        .map(|h| {
            let state = store.account_mut(&h.account.name);
            let result =
                run_account_cycle_with(h.account, h.broker, config, state, sink, sleeper, now);
            if let Err(err) = &result {
                warn!(account = %h.account.name, kind = err.kind(), error = %err, "account cycle aborted");
            }
            AccountRun {
                account: h.account.name.clone(),
                result,
            }
        })
        .collect()
}

struct AccountCycle<'a> {
    account: &'a str,
    broker: &'a dyn Broker,
    config: &'a BotConfig,
    state: &'a mut RiskState,
    sink: &'a dyn AuditSink,
    sleeper: &'a dyn Sleeper,
    now: DateTime<Utc>,
    evaluator: SignalEvaluator,
    sizer: PositionSizer,
    gate: RiskGate,
    window_open: bool,
    snapshot: AccountSnapshot,
    /// Local cash view, decremented as buys fill.
    cash: f64,
    held: BTreeMap<String, PositionSnapshot>,
}

impl AccountCycle<'_> {
    fn controller(&self) -> OrderExecutionController<'_> {
        OrderExecutionController::new(self.broker, &self.config.execution, self.sleeper)
    }

    /// Cancel everything, flatten the book, audit each closed position.
    fn trip_breaker(&mut self, trip: BreakerTrip) {
        warn!(account = self.account, %trip, "circuit breaker tripped, closing all positions");
        match self.broker.cancel_all_orders() {
            Ok(n) => info!(account = self.account, canceled = n, "open orders canceled"),
            Err(e) => warn!(account = self.account, error = %e, "cancel all orders failed"),
        }
        let closed = match self.broker.close_all_positions() {
            Ok(results) => results.len(),
            Err(e) => {
                warn!(account = self.account, error = %e, "close all positions failed");
                return;
            }
        };
        let notes = format!("circuit breaker: {trip}");
        for pos in std::mem::take(&mut self.held).into_values() {
            self.state.record_close(&pos.symbol, self.now);
            self.sink.record(&TradeAuditRecord {
                timestamp_utc: self.now,
                account: self.account.to_string(),
                symbol: pos.symbol.clone(),
                side: OrderSide::Sell,
                qty: pos.qty,
                intended_value: pos.market_value(),
                avg_fill_price: None,
                stop_price: None,
                take_profit_price: None,
                notes: notes.clone(),
            });
        }
        info!(account = self.account, closed, "positions closed");
        self.refresh_account(0.0);
    }

    fn process_symbol(&mut self, symbol: &str) -> Result<SymbolReport, TradingError> {
        let data = &self.config.data;
        let (bars, data_error) = match self.broker.get_bars(symbol, data.timeframe, data.bar_limit) {
            Ok(bars) => (bars, None),
            Err(e) => {
                warn!(account = self.account, symbol, error = %e, "bar fetch failed");
                let err = TradingError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                };
                (Vec::new(), Some(err))
            }
        };

        let (decision, set) = self.evaluator.evaluate_with_indicators(&bars);
        log_decision(self.account, symbol, &decision, &set);

        let mut quote = None;
        let last_close = bars
            .last()
            .map(|b| b.close)
            .filter(|p| p.is_finite() && *p > 0.0);
        let price = match last_close {
            Some(p) => p,
            None => {
                quote = self.fetch_quote(symbol);
                match quote.and_then(|q| q.mid()) {
                    Some(mid) => mid,
                    None => {
                        return Err(data_error.unwrap_or_else(|| TradingError::DataUnavailable {
                            symbol: symbol.to_string(),
                            reason: "no bars and no quote".to_string(),
                        }))
                    }
                }
            }
        };

        let report = SymbolReport {
            price: Some(price),
            decision: Some(decision.clone()),
            error: data_error.as_ref().map(ErrorNote::from),
            ..SymbolReport::new(symbol)
        };

        if let Some(pos) = self.held.get(symbol).cloned() {
            if let Some(reason) = self.gate.check_exit(&pos, price, self.state) {
                info!(account = self.account, symbol, %reason, "forced exit");
                return Ok(self.close(report, &pos, price, &reason.to_string()));
            }
            if decision.signal == Signal::Sell {
                if !self.window_open {
                    info!(account = self.account, symbol, "sell signal outside window, observing only");
                    return Ok(report.with_action(SymbolAction::Suppressed {
                        reason: "outside trading window".to_string(),
                    }));
                }
                let why = format!("sell signal: {}", decision.reason);
                return Ok(self.close(report, &pos, price, &why));
            }
        }

        if data_error.is_some() || decision.signal != Signal::Buy {
            return Ok(report);
        }

        if self.gate.config().max_spread_pct.is_some() && quote.is_none() {
            quote = self.fetch_quote(symbol);
        }
        let ctx = EntryContext {
            symbol,
            now: self.now,
            last_volume: bars.last().map(|b| b.volume),
            quote,
        };
        if let Err(rejection) = self.gate.check_entry(&ctx, self.state) {
            info!(account = self.account, symbol, reason = %rejection, "entry suppressed");
            return Ok(report.with_action(SymbolAction::Suppressed {
                reason: rejection.to_string(),
            }));
        }

        Ok(self.enter(report, price, &decision, &set))
    }

    fn enter(
        &mut self,
        mut report: SymbolReport,
        price: f64,
        decision: &SignalDecision,
        set: &IndicatorSet,
    ) -> SymbolReport {
        let symbol = report.symbol.clone();
        let Some(bracket) = self.sizer.bracket_for(price, set.atr()) else {
            info!(account = self.account, symbol = %symbol, price, "no valid stop, entry skipped");
            return report.with_action(SymbolAction::Skipped {
                reason: "no valid stop below price".to_string(),
            });
        };

        let current_position_value = self
            .held
            .get(&symbol)
            .map_or(0.0, |p| p.qty * price);
        let sizing_price = self.config.execution.worst_fill_price(price, OrderSide::Buy);
        let sizing = self.sizer.size(&SizingInput {
            equity: self.snapshot.equity,
            cash: self.cash,
            price: sizing_price,
            stop_price: bracket.stop_price,
            current_position_value,
        });
        if sizing.is_empty() {
            info!(account = self.account, symbol = %symbol, limited_by = ?sizing.limited_by, "sized to zero");
            return report.with_action(SymbolAction::Skipped {
                reason: format!("sized to zero (limited by {:?})", sizing.limited_by),
            });
        }

        let intent = OrderIntent {
            symbol: symbol.clone(),
            side: OrderSide::Buy,
            quantity: sizing.quantity,
            reference_price: price,
            bracket: Some(bracket),
        };
        info!(
            account = self.account,
            symbol = %symbol,
            side = %OrderSide::Buy,
            qty = ?sizing.quantity,
            stop = bracket.stop_price,
            take_profit = bracket.take_profit_price,
            "placing entry"
        );

        let controller = self.controller();
        let outcomes = if self.config.execution.slices > 1 {
            controller.execute_sliced(&intent).slices
        } else {
            vec![controller.execute(&intent)]
        };

        // Notional orders carry no bracket legs.
        let audit_bracket = sizing.quantity.shares().map(|_| bracket);
        let notes = format!("entry: {}", decision.reason);
        let mut filled_qty = 0.0;
        let mut filled_value = 0.0;
        let mut all_filled = true;
        let mut last_error = None;
        for outcome in &outcomes {
            log_attempts(self.account, outcome);
            self.sink.record(&TradeAuditRecord::from_outcome(
                self.account,
                self.now,
                outcome,
                outcome.requested.value_at(price),
                audit_bracket,
                &notes,
            ));
            if outcome.is_filled() {
                filled_qty += outcome.filled_qty;
                filled_value += outcome.filled_value();
            }
            all_filled &= outcome.status == ExecutionStatus::Filled;
            if outcome.error.is_some() {
                last_error = outcome.error.clone();
            }
        }

        if filled_qty <= 0.0 {
            let err = last_error.unwrap_or_else(|| TradingError::OrderTimeout {
                symbol: symbol.clone(),
                attempts: outcomes.iter().map(|o| o.attempts.len() as u32).sum(),
            });
            warn!(account = self.account, symbol = %symbol, kind = err.kind(), error = %err, "entry failed");
            report.error = Some(ErrorNote::from(&err));
            return report.with_action(SymbolAction::Failed);
        }

        let avg_fill_price = (filled_value > 0.0).then(|| filled_value / filled_qty);
        let fill_price = avg_fill_price.unwrap_or(price);
        self.cash -= filled_qty * fill_price;
        self.record_buy(&symbol, filled_qty, fill_price);
        info!(
            account = self.account,
            symbol = %symbol,
            qty = filled_qty,
            avg_fill_price = fill_price,
            cash_left = self.cash,
            "entry filled"
        );
        report.with_action(SymbolAction::Entered {
            qty: filled_qty,
            avg_fill_price,
            stop_price: bracket.stop_price,
            take_profit_price: bracket.take_profit_price,
            partial: !all_filled,
        })
    }

    /// Market-close `position` at `price`, audit it, start the cooldown.
    fn close(
        &mut self,
        mut report: SymbolReport,
        position: &PositionSnapshot,
        price: f64,
        why: &str,
    ) -> SymbolReport {
        let position = PositionSnapshot {
            current_price: price,
            ..position.clone()
        };
        let outcome = self.controller().close_position(&position, why);
        log_attempts(self.account, &outcome);
        self.sink.record(&TradeAuditRecord::from_outcome(
            self.account,
            self.now,
            &outcome,
            position.market_value(),
            None,
            why,
        ));

        if outcome.filled_qty <= 0.0 {
            let err = outcome.error.clone().unwrap_or_else(|| TradingError::OrderTimeout {
                symbol: position.symbol.clone(),
                attempts: outcome.attempts.len() as u32,
            });
            warn!(account = self.account, symbol = %position.symbol, kind = err.kind(), error = %err, "close failed");
            report.error = Some(ErrorNote::from(&err));
            return report.with_action(SymbolAction::Failed);
        }

        self.state.record_close(&position.symbol, self.now);
        let remaining = position.qty - outcome.filled_qty;
        if remaining > 0.0 {
            if let Some(p) = self.held.get_mut(&position.symbol) {
                p.qty = remaining;
            }
        } else {
            self.held.remove(&position.symbol);
        }
        info!(
            account = self.account,
            symbol = %position.symbol,
            side = %OrderSide::Sell,
            qty = outcome.filled_qty,
            order_id = ?outcome.order_id,
            "position closed"
        );
        self.refresh_account(outcome.filled_value());

        report.with_action(SymbolAction::Exited {
            reason: why.to_string(),
            qty: outcome.filled_qty,
            avg_fill_price: outcome.avg_fill_price,
        })
    }

    fn record_buy(&mut self, symbol: &str, qty: f64, price: f64) {
        let pos = self
            .held
            .entry(symbol.to_string())
            .or_insert_with(|| PositionSnapshot {
                symbol: symbol.to_string(),
                qty: 0.0,
                avg_entry_price: price,
                current_price: price,
                unrealized_plpc: 0.0,
            });
        let total = pos.qty + qty;
        pos.avg_entry_price = (pos.avg_entry_price * pos.qty + price * qty) / total;
        pos.qty = total;
        pos.current_price = price;
    }

    /// Re-read the account after a close. Falls back to crediting the local
    /// cash view with `proceeds`.
    fn refresh_account(&mut self, proceeds: f64) {
        match self.broker.get_account() {
            Ok(snapshot) => {
                self.cash = snapshot.cash;
                self.snapshot = snapshot;
            }
            Err(e) => {
                warn!(account = self.account, error = %e, "account refresh failed, using local view");
                self.cash += proceeds;
            }
        }
    }

    fn fetch_quote(&self, symbol: &str) -> Option<Quote> {
        match self.broker.get_latest_quote(symbol) {
            Ok(q) => Some(q),
            Err(e) => {
                debug!(account = self.account, symbol, error = %e, "quote unavailable");
                None
            }
        }
    }
}

fn log_decision(account: &str, symbol: &str, decision: &SignalDecision, set: &IndicatorSet) {
    info!(
        account,
        symbol,
        signal = %decision.signal,
        reason = %decision.reason,
        "signal"
    );
    debug!(
        account,
        symbol,
        sma_fast = set.sma_fast,
        sma_slow = set.sma_slow,
        rsi = set.rsi,
        atr = set.atr,
        vwap = set.vwap,
        trend_slope = set.trend_slope,
        bars = set.bar_count,
        "indicators"
    );
}

fn log_attempts(account: &str, outcome: &ExecutionOutcome) {
    for a in &outcome.attempts {
        debug!(
            account,
            symbol = %outcome.symbol,
            side = %outcome.side,
            attempt = a.attempt,
            order_type = ?a.order_type,
            qty = ?a.quantity,
            limit_price = ?a.limit_price,
            order_id = ?a.order_id,
            outcome = ?a.outcome,
            fallback = a.fallback,
            "order attempt"
        );
    }
}
