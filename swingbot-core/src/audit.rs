//! Per-trade audit records and the sinks that receive them.
//!
//! One record per placed or failed order, whatever the outcome. The record
//! layout is flat so it serializes cleanly to JSON lines or CSV.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::domain::{Bracket, OrderQuantity, OrderSide};
use crate::execution::ExecutionOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAuditRecord {
    pub timestamp_utc: DateTime<Utc>,
    pub account: String,
    pub symbol: String,
    pub side: OrderSide,
    /// Shares filled, or requested when nothing filled. Zero for an
    /// unfilled notional order.
    pub qty: f64,
    /// Dollar amount for notional orders.
    pub intended_value: f64,
    pub avg_fill_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub notes: String,
}

impl TradeAuditRecord {
    /// Build a record from an execution outcome. Failures are recorded with
    /// their error appended to `notes`.
    pub fn from_outcome(
        account: &str,
        at: DateTime<Utc>,
        outcome: &ExecutionOutcome,
        intended_value: f64,
        bracket: Option<Bracket>,
        notes: &str,
    ) -> Self {
        let mut notes = notes.to_string();
        let intended_value = match outcome.requested {
            OrderQuantity::Notional(n) => n,
            OrderQuantity::Shares(_) => intended_value,
        };
        let qty = match outcome.requested {
            _ if outcome.filled_qty > 0.0 => outcome.filled_qty,
            OrderQuantity::Shares(q) => q,
            OrderQuantity::Notional(n) => {
                notes.push_str(&format!("; requested notional ${n:.2}"));
                0.0
            }
        };
        if outcome.used_fallback {
            notes.push_str("; market fallback");
        }
        if let Some(err) = &outcome.error {
            notes.push_str(&format!("; failed: {err}"));
        }
        Self {
            timestamp_utc: at,
            account: account.to_string(),
            symbol: outcome.symbol.clone(),
            side: outcome.side,
            qty,
            intended_value,
            avg_fill_price: outcome.avg_fill_price,
            stop_price: bracket.map(|b| b.stop_price),
            take_profit_price: bracket.map(|b| b.take_profit_price),
            notes,
        }
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &TradeAuditRecord);
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<TradeAuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TradeAuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &TradeAuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Emits each record as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, r: &TradeAuditRecord) {
        info!(
            target: "swingbot::audit",
            account = %r.account,
            symbol = %r.symbol,
            side = %r.side,
            qty = r.qty,
            intended_value = r.intended_value,
            avg_fill_price = ?r.avg_fill_price,
            stop_price = ?r.stop_price,
            take_profit_price = ?r.take_profit_price,
            notes = %r.notes,
            "trade"
        );
    }
}

/// Fans each record out to several sinks.
pub struct FanoutAuditSink<'a> {
    sinks: Vec<&'a dyn AuditSink>,
}

impl<'a> FanoutAuditSink<'a> {
    pub fn new(sinks: Vec<&'a dyn AuditSink>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink<'_> {
    fn record(&self, record: &TradeAuditRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderId;
    use crate::error::TradingError;
    use crate::execution::ExecutionStatus;
    use chrono::TimeZone;

    fn outcome(status: ExecutionStatus, filled: f64) -> ExecutionOutcome {
        ExecutionOutcome {
            symbol: "SPY".into(),
            side: OrderSide::Buy,
            requested: OrderQuantity::Shares(10.0),
            status,
            order_id: Some(OrderId::new("paper-1")),
            filled_qty: filled,
            avg_fill_price: (filled > 0.0).then_some(100.1),
            attempts: Vec::new(),
            used_fallback: false,
            error: None,
        }
    }

    #[test]
    fn filled_record_carries_bracket() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let bracket = Bracket {
            stop_price: 97.0,
            take_profit_price: 108.0,
        };
        let r = TradeAuditRecord::from_outcome(
            "main",
            at,
            &outcome(ExecutionStatus::Filled, 10.0),
            1000.0,
            Some(bracket),
            "sma cross up",
        );
        assert_eq!(r.qty, 10.0);
        assert_eq!(r.stop_price, Some(97.0));
        assert_eq!(r.take_profit_price, Some(108.0));
        assert_eq!(r.notes, "sma cross up");
    }

    #[test]
    fn failed_record_keeps_requested_qty_and_reason() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let mut o = outcome(ExecutionStatus::Failed, 0.0);
        o.error = Some(TradingError::OrderTimeout {
            symbol: "SPY".into(),
            attempts: 3,
        });
        let r = TradeAuditRecord::from_outcome("main", at, &o, 1000.0, None, "entry");
        assert_eq!(r.qty, 10.0);
        assert!(r.avg_fill_price.is_none());
        assert!(r.notes.contains("not filled after 3"));
    }

    #[test]
    fn failed_notional_record_keeps_dollar_amount() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let mut o = outcome(ExecutionStatus::Failed, 0.0);
        o.requested = OrderQuantity::Notional(42.5);
        o.error = Some(TradingError::OrderRejected {
            symbol: "SPY".into(),
            reason: "fractional trading disabled".into(),
        });
        let r = TradeAuditRecord::from_outcome("main", at, &o, 0.0, None, "entry");
        assert_eq!(r.qty, 0.0);
        assert_eq!(r.intended_value, 42.5);
        assert!(r.notes.contains("requested notional $42.50"), "{}", r.notes);
        assert!(r.notes.contains("fractional trading disabled"));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = MemoryAuditSink::new();
        let b = MemoryAuditSink::new();
        let sinks: Vec<&dyn AuditSink> = vec![&a, &b, &TracingAuditSink];
        let fan = FanoutAuditSink::new(sinks);
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        fan.record(&TradeAuditRecord::from_outcome(
            "main",
            at,
            &outcome(ExecutionStatus::Filled, 10.0),
            1000.0,
            None,
            "",
        ));
        assert_eq!(a.records().len(), 1);
        assert_eq!(b.records().len(), 1);
    }
}
