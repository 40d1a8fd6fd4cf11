//! Account cycles against the paper broker.

use chrono::{DateTime, Duration, TimeZone, Utc};

use swingbot_core::audit::MemoryAuditSink;
use swingbot_core::broker::{BrokerError, FillMode, PaperBroker};
use swingbot_core::domain::{Bar, OrderSide, Quote};
use swingbot_core::execution::NoSleep;
use swingbot_core::risk::{BreakerTrip, RiskState};
use swingbot_core::signals::{Signal, SignalPolicy};
use swingbot_core::TradingError;
use swingbot_runner::{
    run_account_cycle_with, run_all_accounts, AccountConfig, AccountHandle, BotConfig, StateStore,
    SymbolAction,
};

/// Tuesday 2024-01-02, 10:00 at UTC-05:00.
fn open_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
}

/// Saturday.
fn weekend() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap()
}

/// 60 hourly bars moving `step` per bar from 100, each two dollars wide.
fn trend_bars(step: f64) -> Vec<Bar> {
    let start = open_time() - Duration::hours(60);
    (0..60)
        .map(|i| {
            let close = 100.0 + step * i as f64;
            Bar::new(
                start + Duration::hours(i),
                close - step / 2.0,
                close + 1.0,
                close - 1.0,
                close,
                10_000.0,
            )
        })
        .collect()
}

fn config(symbols: &[&str]) -> BotConfig {
    let mut cfg = BotConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..BotConfig::default()
    };
    cfg.strategy.policy = SignalPolicy::Confirmation;
    cfg.validate().unwrap();
    cfg
}

fn account() -> AccountConfig {
    AccountConfig::new("paper")
}

fn run(
    broker: &PaperBroker,
    cfg: &BotConfig,
    state: &mut RiskState,
    sink: &MemoryAuditSink,
    now: DateTime<Utc>,
) -> Result<swingbot_runner::CycleReport, TradingError> {
    run_account_cycle_with(&account(), broker, cfg, state, sink, &NoSleep, now)
}

#[test]
fn uptrend_enters_with_bracket_capped_by_trade_limit() {
    let broker = PaperBroker::new(100_000.0);
    broker.set_bars("SPY", trend_bars(0.5));
    let cfg = config(&["SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    let spy = &report.symbols[0];
    assert_eq!(spy.decision.as_ref().unwrap().signal, Signal::Buy);
    match &spy.action {
        SymbolAction::Entered {
            qty,
            stop_price,
            take_profit_price,
            partial,
            ..
        } => {
            // floor(0.20 * 100_000 / 130.1475), sized at the top of the limit ladder
            assert_eq!(*qty, 153.0);
            assert_eq!(*stop_price, 126.5);
            assert!(*take_profit_price > 129.5);
            assert!(!partial);
        }
        other => panic!("expected entry, got {other:?}"),
    }

    let sent = broker.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].side, OrderSide::Buy);
    assert!(sent[0].bracket.is_some());
    assert_eq!(broker.position("SPY").unwrap().qty, 153.0);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].account, "paper");
    assert_eq!(records[0].stop_price, Some(126.5));
    assert!(records[0].notes.starts_with("entry:"));
    assert_eq!(report.config_fingerprint, cfg.fingerprint());
}

#[test]
fn outside_window_signals_are_reported_not_traded() {
    let broker = PaperBroker::new(100_000.0);
    broker.set_bars("SPY", trend_bars(0.5));
    let cfg = config(&["SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, weekend()).unwrap();

    assert!(!report.window_open);
    let spy = &report.symbols[0];
    assert_eq!(spy.decision.as_ref().unwrap().signal, Signal::Buy);
    assert_eq!(
        spy.action,
        SymbolAction::Suppressed {
            reason: "outside trading window".to_string()
        }
    );
    assert!(broker.submissions().is_empty());
    assert!(sink.records().is_empty());
}

#[test]
fn sell_signal_closes_held_position_and_starts_cooldown() {
    let broker = PaperBroker::new(10_000.0);
    let bars = trend_bars(-0.3);
    let last = bars.last().unwrap().close;
    broker.set_bars("SPY", bars);
    broker.add_position("SPY", 10.0, last, last);
    let cfg = config(&["SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    let spy = &report.symbols[0];
    assert_eq!(spy.decision.as_ref().unwrap().signal, Signal::Sell);
    assert!(matches!(&spy.action, SymbolAction::Exited { reason, qty, .. }
        if reason.starts_with("sell signal") && *qty == 10.0));
    assert!(broker.position("SPY").is_none());
    assert_eq!(state.last_close.get("SPY"), Some(&open_time()));
    assert_eq!(sink.records()[0].side, OrderSide::Sell);
}

#[test]
fn stop_loss_closes_even_outside_the_window() {
    let broker = PaperBroker::new(10_000.0);
    broker.set_bars("SPY", trend_bars(0.5));
    broker.add_position("SPY", 5.0, 150.0, 129.5);
    let cfg = config(&["SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, weekend()).unwrap();

    assert!(matches!(&report.symbols[0].action, SymbolAction::Exited { reason, .. }
        if reason.contains("stop-loss")));
    assert!(broker.position("SPY").is_none());
    assert_eq!(report.exits(), 1);
}

#[test]
fn one_bad_symbol_does_not_stop_the_rest() {
    let broker = PaperBroker::new(100_000.0);
    broker.fail_bars("BAD");
    broker.set_bars("SPY", trend_bars(0.5));
    let cfg = config(&["BAD", "SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    assert_eq!(report.symbols.len(), 2);
    let bad = &report.symbols[0];
    assert_eq!(bad.error.as_ref().unwrap().kind, "data_unavailable");
    assert_eq!(bad.action, SymbolAction::None);
    assert!(matches!(report.symbols[1].action, SymbolAction::Entered { .. }));
    assert_eq!(report.errors(), 1);
}

#[test]
fn missing_bars_fall_back_to_quote_for_exits() {
    let broker = PaperBroker::new(10_000.0);
    broker.fail_bars("SPY");
    broker.set_quote("SPY", Quote { bid: 89.5, ask: 90.5 });
    broker.add_position("SPY", 5.0, 100.0, 100.0);
    let cfg = config(&["SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    let spy = &report.symbols[0];
    assert_eq!(spy.price, Some(90.0));
    assert!(matches!(spy.action, SymbolAction::Exited { .. }));
    assert_eq!(spy.error.as_ref().unwrap().kind, "data_unavailable");
}

#[test]
fn account_failure_aborts_only_that_account() {
    let down = PaperBroker::new(100_000.0);
    down.fail_account(Some(BrokerError::Network("timeout".into())));
    let up = PaperBroker::new(100_000.0);
    up.set_bars("SPY", trend_bars(0.5));

    let mut cfg = config(&["SPY"]);
    cfg.accounts = vec![AccountConfig::new("down"), AccountConfig::new("up")];
    let handles = [
        AccountHandle {
            account: &cfg.accounts[0],
            broker: &down,
        },
        AccountHandle {
            account: &cfg.accounts[1],
            broker: &up,
        },
    ];
    let sink = MemoryAuditSink::new();
    let mut store = StateStore::new();

    let runs = run_all_accounts(&handles, &cfg, &mut store, &sink, &NoSleep, open_time());

    assert_eq!(runs.len(), 2);
    assert!(matches!(
        runs[0].result,
        Err(TradingError::AccountUnavailable { ref account, .. }) if account == "down"
    ));
    let up_report = runs[1].result.as_ref().unwrap();
    assert_eq!(up_report.entries(), 1);
    assert!(down.submissions().is_empty());
}

#[test]
fn loss_limit_flattens_book_and_halts_for_the_day() {
    let broker = PaperBroker::new(100_000.0);
    broker.set_bars("SPY", trend_bars(0.5));
    broker.add_position("SPY", 100.0, 129.5, 129.5);
    // Equity 112_950 against a prior close of 120_000.
    broker.set_last_equity(120_000.0);
    let mut cfg = config(&["SPY"]);
    cfg.risk.daily_loss_limit_pct = Some(0.02);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    assert!(matches!(report.breaker, Some(BreakerTrip::LossLimit { .. })));
    assert!(report.halted);
    assert_eq!(broker.cancel_all_calls(), 1);
    assert_eq!(broker.close_all_calls(), 1);
    assert!(broker.position("SPY").is_none());
    assert!(state.is_halted(cfg.risk.window.local_date(open_time())));
    assert!(sink.records()[0].notes.starts_with("circuit breaker"));

    // The buy signal is still reported, but the halt suppresses the entry.
    assert_eq!(
        report.symbols[0].action,
        SymbolAction::Suppressed {
            reason: "trading halted for the day".to_string()
        }
    );

    // Later the same day: still halted, no second flatten.
    let later = run(&broker, &cfg, &mut state, &sink, open_time() + Duration::hours(1)).unwrap();
    assert!(later.halted);
    assert!(later.breaker.is_none());
    assert_eq!(broker.close_all_calls(), 1);
    assert!(broker.submissions().is_empty());
}

#[test]
fn cooldown_blocks_reentry() {
    let broker = PaperBroker::new(100_000.0);
    broker.set_bars("SPY", trend_bars(0.5));
    let cfg = config(&["SPY"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();
    state.record_close("SPY", open_time() - Duration::minutes(10));

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    assert!(matches!(&report.symbols[0].action, SymbolAction::Suppressed { reason }
        if reason.starts_with("cooldown")));
    assert!(broker.submissions().is_empty());
}

#[test]
fn later_symbols_size_against_reduced_cash() {
    let broker = PaperBroker::new(30_000.0);
    broker.set_bars("AAA", trend_bars(0.5));
    broker.set_bars("BBB", trend_bars(0.5));
    let mut cfg = config(&["AAA", "BBB"]);
    cfg.sizing.max_trade_pct = 0.6;
    cfg.sizing.max_position_pct = 0.6;
    cfg.sizing.risk_per_trade_pct = 0.5;
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    let qty = |i: usize| match report.symbols[i].action {
        SymbolAction::Entered { qty, .. } => qty,
        ref other => panic!("expected entry, got {other:?}"),
    };
    // floor(18_000 / 130.1475) for the first, then whatever cash is left.
    assert_eq!(qty(0), 138.0);
    assert!(qty(1) < qty(0));
    assert!(broker.cash() >= 0.0);
}

#[test]
fn rejected_entry_is_audited_and_isolated() {
    let broker = PaperBroker::new(100_000.0).with_fill_mode(FillMode::Reject("halted".into()));
    broker.set_bars("SPY", trend_bars(0.5));
    broker.set_bars("QQQ", trend_bars(0.5));
    let cfg = config(&["SPY", "QQQ"]);
    let sink = MemoryAuditSink::new();
    let mut state = RiskState::new();

    let report = run(&broker, &cfg, &mut state, &sink, open_time()).unwrap();

    for s in &report.symbols {
        assert_eq!(s.action, SymbolAction::Failed);
        assert_eq!(s.error.as_ref().unwrap().kind, "order_rejected");
    }
    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.avg_fill_price.is_none()));
}
