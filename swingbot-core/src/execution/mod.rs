//! OrderExecutionController: places a sized order and supervises it to a
//! fill, a clean failure, or a market fallback.
//!
//! Per attempt: submit, poll every `poll_interval_secs` for at most the
//! current wait budget, cancel on timeout, grow the budget by
//! `wait_multiplier`, and re-price the limit one step more aggressively.
//! A rejection ends the retries. After the last attempt, at most one market
//! order is sent if `market_fallback` is set.
//!
//! Every attempt is returned as an [`AttemptRecord`] and logged.

pub mod sleeper;
pub mod slippage;

pub use sleeper::{NoSleep, RecordingSleeper, Sleeper, ThreadSleeper};
pub use slippage::{slice_base_slippage, SlippageSchedule};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerError};
use crate::domain::{
    Bracket, OrderId, OrderKind, OrderQuantity, OrderRequest, OrderResult, OrderSide, OrderStatus,
    PositionSnapshot, TimeInForce,
};
use crate::error::{ConfigError, TradingError};
use crate::sizing::round_price;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Order type for the regular attempts.
    pub order_type: OrderKind,
    pub time_in_force: TimeInForce,
    pub poll_interval_secs: f64,
    /// Wait budget of the first attempt.
    pub retry_after_secs: f64,
    pub wait_multiplier: f64,
    pub max_attempts: u32,
    pub base_slippage_pct: f64,
    /// Extra slippage added on each retry.
    pub slippage_step_pct: f64,
    pub max_slippage_pct: f64,
    pub market_fallback: bool,
    /// Sequential slices a buy decision is split into.
    pub slices: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_type: OrderKind::Limit,
            time_in_force: TimeInForce::Day,
            poll_interval_secs: 1.0,
            retry_after_secs: 10.0,
            wait_multiplier: 1.5,
            max_attempts: 3,
            base_slippage_pct: 0.001,
            slippage_step_pct: 0.001,
            max_slippage_pct: 0.005,
            market_fallback: true,
            slices: 1,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.poll_interval_secs > 0.0 && self.poll_interval_secs.is_finite()) {
            return Err(ConfigError::invalid("execution.poll_interval_secs", "must be > 0"));
        }
        if !(self.retry_after_secs > 0.0 && self.retry_after_secs.is_finite()) {
            return Err(ConfigError::invalid("execution.retry_after_secs", "must be > 0"));
        }
        if !(self.wait_multiplier >= 1.0 && self.wait_multiplier.is_finite()) {
            return Err(ConfigError::invalid("execution.wait_multiplier", "must be >= 1"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("execution.max_attempts", "must be >= 1"));
        }
        if self.slices == 0 {
            return Err(ConfigError::invalid("execution.slices", "must be >= 1"));
        }
        if self.base_slippage_pct < 0.0 || self.slippage_step_pct < 0.0 {
            return Err(ConfigError::invalid(
                "execution.base_slippage_pct",
                "slippage must be >= 0",
            ));
        }
        if !(self.max_slippage_pct < 1.0) || self.base_slippage_pct > self.max_slippage_pct {
            return Err(ConfigError::invalid(
                "execution.max_slippage_pct",
                format!(
                    "must be >= base_slippage_pct ({}) and < 1",
                    self.base_slippage_pct
                ),
            ));
        }
        Ok(())
    }

    pub fn schedule(&self) -> SlippageSchedule {
        SlippageSchedule {
            base_pct: self.base_slippage_pct,
            step_pct: self.slippage_step_pct,
            max_pct: self.max_slippage_pct,
        }
    }

    /// Furthest price the limit ladder can reach from `reference`. Buys are
    /// sized at this price so an escalated fill stays inside the sizing caps.
    pub fn worst_fill_price(&self, reference: f64, side: OrderSide) -> f64 {
        round_price(reference * (1.0 + side.sign() * self.max_slippage_pct))
    }

    /// Number of polls that fit in `wait_secs`, at least one.
    pub fn polls_for(&self, wait_secs: f64) -> u32 {
        ((wait_secs / self.poll_interval_secs).ceil() as u32).max(1)
    }
}

/// A sized trade ready for the market.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: OrderQuantity,
    /// Price the limit ladder is anchored to.
    pub reference_price: f64,
    pub bracket: Option<Bracket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Filled,
    PartiallyFilled,
    TimedOut,
    Rejected(String),
    Error(String),
}

/// One submission and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based; the market fallback continues the numbering.
    pub attempt: u32,
    pub order_type: OrderKind,
    pub quantity: OrderQuantity,
    pub limit_price: Option<f64>,
    pub order_id: Option<OrderId>,
    pub outcome: AttemptOutcome,
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Filled,
    PartiallyFilled,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub symbol: String,
    pub side: OrderSide,
    pub requested: OrderQuantity,
    pub status: ExecutionStatus,
    pub order_id: Option<OrderId>,
    pub filled_qty: f64,
    pub avg_fill_price: Option<f64>,
    pub attempts: Vec<AttemptRecord>,
    pub used_fallback: bool,
    /// Why the order failed, for `Failed` outcomes.
    pub error: Option<TradingError>,
}

impl ExecutionOutcome {
    pub fn is_filled(&self) -> bool {
        self.status != ExecutionStatus::Failed
    }

    /// Dollar value filled, when a fill price is known.
    pub fn filled_value(&self) -> f64 {
        self.avg_fill_price.map_or(0.0, |p| p * self.filled_qty)
    }
}

/// Aggregate of a multi-slice execution. Some slices filling and others not
/// is an accepted outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicedOutcome {
    pub slices: Vec<ExecutionOutcome>,
    pub status: ExecutionStatus,
    pub filled_qty: f64,
    pub avg_fill_price: Option<f64>,
}

impl SlicedOutcome {
    fn from_slices(slices: Vec<ExecutionOutcome>) -> Self {
        let filled: Vec<&ExecutionOutcome> = slices.iter().filter(|s| s.is_filled()).collect();
        let filled_qty: f64 = filled.iter().map(|s| s.filled_qty).sum();
        let value: f64 = filled.iter().map(|s| s.filled_value()).sum();
        let avg_fill_price = (filled_qty > 0.0 && value > 0.0).then(|| value / filled_qty);
        let status = if filled.is_empty() {
            ExecutionStatus::Failed
        } else if filled.len() == slices.len()
            && filled.iter().all(|s| s.status == ExecutionStatus::Filled)
        {
            ExecutionStatus::Filled
        } else {
            ExecutionStatus::PartiallyFilled
        };
        Self {
            slices,
            status,
            filled_qty,
            avg_fill_price,
        }
    }

    pub fn attempts(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.slices.iter().flat_map(|s| s.attempts.iter())
    }
}

enum Poll {
    Fill(OrderResult),
    Timeout,
    Dead(String),
}

pub struct OrderExecutionController<'a> {
    broker: &'a dyn Broker,
    config: &'a ExecutionConfig,
    sleeper: &'a dyn Sleeper,
}

impl<'a> OrderExecutionController<'a> {
    pub fn new(broker: &'a dyn Broker, config: &'a ExecutionConfig, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            broker,
            config,
            sleeper,
        }
    }

    /// Execute one intent with the configured retry ladder.
    pub fn execute(&self, intent: &OrderIntent) -> ExecutionOutcome {
        self.execute_with_schedule(intent, self.config.schedule())
    }

    /// Split `intent` into `config.slices` sequential slices. Slice `i` starts
    /// its ladder at `base * (1 + i / (n - 1))`.
    pub fn execute_sliced(&self, intent: &OrderIntent) -> SlicedOutcome {
        let quantities = split_quantity(intent.quantity, self.config.slices);
        let n = quantities.len();
        let outcomes = quantities
            .into_iter()
            .enumerate()
            .map(|(i, quantity)| {
                let slice = OrderIntent {
                    quantity,
                    ..intent.clone()
                };
                debug!(symbol = %intent.symbol, slice = i + 1, of = n, "executing slice");
                self.execute_with_schedule(&slice, self.config.schedule().for_slice(i, n))
            })
            .collect();
        SlicedOutcome::from_slices(outcomes)
    }

    /// Unconditional market sell of the whole position.
    pub fn close_position(&self, position: &PositionSnapshot, reason: &str) -> ExecutionOutcome {
        info!(symbol = %position.symbol, qty = position.qty, reason, "closing position at market");
        let intent = OrderIntent {
            symbol: position.symbol.clone(),
            side: OrderSide::Sell,
            quantity: OrderQuantity::Shares(position.qty),
            reference_price: position.current_price,
            bracket: None,
        };
        let mut attempts = Vec::new();
        match self.market_attempt(&intent, 1, false, &mut attempts) {
            Some(fill) => self.finish(&intent, attempts, Some(fill), false, None),
            None => {
                let err = last_failure(&intent.symbol, &attempts);
                self.finish(&intent, attempts, None, false, Some(err))
            }
        }
    }

    fn execute_with_schedule(&self, intent: &OrderIntent, schedule: SlippageSchedule) -> ExecutionOutcome {
        let cfg = self.config;
        let mut attempts = Vec::new();

        // Notional orders go out as plain market orders.
        let market_only =
            cfg.order_type == OrderKind::Market || matches!(intent.quantity, OrderQuantity::Notional(_));

        let mut wait = cfg.retry_after_secs;
        let mut rejected = false;
        for k in 0..cfg.max_attempts {
            let attempt = k + 1;
            let request = if market_only {
                self.market_request(intent)
            } else {
                let limit = schedule.limit_price(intent.reference_price, intent.side, k);
                OrderRequest::limit(intent.symbol.clone(), intent.side, intent.quantity, limit)
                    .with_bracket(intent.bracket)
                    .with_time_in_force(cfg.time_in_force)
            };

            match self.attempt(&request, attempt, wait, false, &mut attempts) {
                AttemptEnd::Filled(fill) => {
                    return self.finish(intent, attempts, Some(fill), false, None)
                }
                AttemptEnd::Rejected => {
                    rejected = true;
                    break;
                }
                AttemptEnd::Continue => {}
            }
            wait *= cfg.wait_multiplier;
        }

        if cfg.market_fallback {
            let attempt = attempts.len() as u32 + 1;
            warn!(
                symbol = %intent.symbol,
                side = %intent.side,
                attempts = attempt - 1,
                rejected,
                "retries exhausted, sending market fallback"
            );
            if let Some(fill) = self.market_attempt(intent, attempt, true, &mut attempts) {
                return self.finish(intent, attempts, Some(fill), true, None);
            }
            let err = last_failure(&intent.symbol, &attempts);
            return self.finish(intent, attempts, None, true, Some(err));
        }

        let err = if rejected {
            last_failure(&intent.symbol, &attempts)
        } else {
            TradingError::OrderTimeout {
                symbol: intent.symbol.clone(),
                attempts: attempts.len() as u32,
            }
        };
        self.finish(intent, attempts, None, false, Some(err))
    }

    fn market_request(&self, intent: &OrderIntent) -> OrderRequest {
        let bracket = match intent.quantity {
            OrderQuantity::Shares(_) => intent.bracket,
            OrderQuantity::Notional(_) => None,
        };
        OrderRequest::market(intent.symbol.clone(), intent.side, intent.quantity)
            .with_bracket(bracket)
            .with_time_in_force(self.config.time_in_force)
    }

    fn market_attempt(
        &self,
        intent: &OrderIntent,
        attempt: u32,
        fallback: bool,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Option<OrderResult> {
        let request = self.market_request(intent);
        match self.attempt(&request, attempt, self.config.retry_after_secs, fallback, attempts) {
            AttemptEnd::Filled(fill) => Some(fill),
            _ => None,
        }
    }

    /// Submit `request`, then poll for up to `wait_secs`.
    fn attempt(
        &self,
        request: &OrderRequest,
        attempt: u32,
        wait_secs: f64,
        fallback: bool,
        attempts: &mut Vec<AttemptRecord>,
    ) -> AttemptEnd {
        let mut record = AttemptRecord {
            attempt,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            order_id: None,
            outcome: AttemptOutcome::TimedOut,
            fallback,
        };

        let submitted = match self.broker.submit_order(request) {
            Ok(result) if result.status == OrderStatus::Rejected => {
                Err(BrokerError::rejected("rejected on submission"))
            }
            other => other,
        };

        let end = match submitted {
            Err(BrokerError::Rejected { reason }) => {
                record.outcome = AttemptOutcome::Rejected(reason);
                AttemptEnd::Rejected
            }
            Err(err) => {
                record.outcome = AttemptOutcome::Error(err.to_string());
                AttemptEnd::Continue
            }
            Ok(result) => {
                record.order_id = Some(result.order_id.clone());
                match self.await_fill(result, wait_secs) {
                    Poll::Fill(fill) => {
                        record.outcome = if fill.status == OrderStatus::Filled {
                            AttemptOutcome::Filled
                        } else {
                            AttemptOutcome::PartiallyFilled
                        };
                        AttemptEnd::Filled(fill)
                    }
                    Poll::Timeout => {
                        if let Some(id) = &record.order_id {
                            if let Err(err) = self.broker.cancel_order(id) {
                                warn!(order_id = %id, error = %err, "cancel after timeout failed");
                            }
                        }
                        AttemptEnd::Continue
                    }
                    Poll::Dead(reason) => {
                        record.outcome = AttemptOutcome::Rejected(reason);
                        AttemptEnd::Rejected
                    }
                }
            }
        };

        log_attempt(request, &record);
        attempts.push(record);
        end
    }

    fn await_fill(&self, submitted: OrderResult, wait_secs: f64) -> Poll {
        if submitted.has_fill() && submitted.status.is_terminal() {
            return Poll::Fill(submitted);
        }
        let interval = Duration::from_secs_f64(self.config.poll_interval_secs);
        let mut last = submitted;
        for _ in 0..self.config.polls_for(wait_secs) {
            if last.has_fill() {
                return Poll::Fill(last);
            }
            self.sleeper.sleep(interval);
            match self.broker.get_order(&last.order_id) {
                Ok(r) => last = r,
                Err(err) => debug!(order_id = %last.order_id, error = %err, "order poll failed"),
            }
            match last.status {
                OrderStatus::Rejected => return Poll::Dead("rejected".into()),
                OrderStatus::Canceled => return Poll::Dead("canceled".into()),
                _ => {}
            }
        }
        if last.has_fill() {
            Poll::Fill(last)
        } else {
            Poll::Timeout
        }
    }

    fn finish(
        &self,
        intent: &OrderIntent,
        attempts: Vec<AttemptRecord>,
        fill: Option<OrderResult>,
        used_fallback: bool,
        error: Option<TradingError>,
    ) -> ExecutionOutcome {
        let (status, order_id, filled_qty, avg_fill_price) = match fill {
            Some(r) => (
                if r.status == OrderStatus::Filled {
                    ExecutionStatus::Filled
                } else {
                    ExecutionStatus::PartiallyFilled
                },
                Some(r.order_id),
                r.filled_qty,
                r.filled_avg_price,
            ),
            None => (ExecutionStatus::Failed, None, 0.0, None),
        };
        if let Some(err) = &error {
            warn!(symbol = %intent.symbol, side = %intent.side, error = %err, "execution failed");
        }
        ExecutionOutcome {
            symbol: intent.symbol.clone(),
            side: intent.side,
            requested: intent.quantity,
            status,
            order_id,
            filled_qty,
            avg_fill_price,
            attempts,
            used_fallback,
            error,
        }
    }
}

enum AttemptEnd {
    Filled(OrderResult),
    Rejected,
    Continue,
}

fn log_attempt(request: &OrderRequest, record: &AttemptRecord) {
    let order_id = record.order_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-");
    match &record.outcome {
        AttemptOutcome::Filled | AttemptOutcome::PartiallyFilled => info!(
            symbol = %request.symbol,
            side = %request.side,
            attempt = record.attempt,
            order_id,
            limit_price = ?record.limit_price,
            fallback = record.fallback,
            outcome = ?record.outcome,
            "order attempt filled"
        ),
        outcome => warn!(
            symbol = %request.symbol,
            side = %request.side,
            attempt = record.attempt,
            order_id,
            limit_price = ?record.limit_price,
            fallback = record.fallback,
            outcome = ?outcome,
            "order attempt did not fill"
        ),
    }
}

fn last_failure(symbol: &str, attempts: &[AttemptRecord]) -> TradingError {
    let rejection = attempts.iter().rev().find_map(|a| match &a.outcome {
        AttemptOutcome::Rejected(reason) => Some(reason.clone()),
        _ => None,
    });
    match rejection {
        Some(reason) => TradingError::OrderRejected {
            symbol: symbol.to_string(),
            reason,
        },
        None => TradingError::OrderTimeout {
            symbol: symbol.to_string(),
            attempts: attempts.len() as u32,
        },
    }
}

/// Divide a quantity into at most `slices` parts. Whole shares stay whole;
/// the remainder goes to the last slice.
pub fn split_quantity(quantity: OrderQuantity, slices: usize) -> Vec<OrderQuantity> {
    let slices = slices.max(1);
    match quantity {
        OrderQuantity::Shares(total) => {
            let whole = total.fract() == 0.0;
            let n = if whole {
                slices.min(total.max(1.0) as usize)
            } else {
                slices
            };
            let each = if whole {
                (total / n as f64).floor()
            } else {
                total / n as f64
            };
            let mut parts = vec![OrderQuantity::Shares(each); n];
            if let Some(last) = parts.last_mut() {
                *last = OrderQuantity::Shares(total - each * (n - 1) as f64);
            }
            parts
        }
        OrderQuantity::Notional(total) => {
            let each = (total / slices as f64 * 100.0).floor() / 100.0;
            let mut parts = vec![OrderQuantity::Notional(each); slices];
            if let Some(last) = parts.last_mut() {
                *last = OrderQuantity::Notional(((total - each * (slices - 1) as f64) * 100.0).round() / 100.0);
            }
            parts
        }
    }
}
