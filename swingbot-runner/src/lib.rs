//! Swingbot Runner: drives `swingbot-core` one cycle at a time.
//!
//! - Config file loading, validation and fingerprinting
//! - `run_account_cycle`: one evaluation cycle for one account
//! - `run_all_accounts`: every configured account, sequentially
//! - RiskState persistence across invocations
//! - Paper data sources (CSV, seeded synthetic)
//! - Daily P&L summary and a JSON-lines audit log

pub mod audit_log;
pub mod config;
pub mod cycle;
pub mod data;
pub mod error;
pub mod report;
pub mod state;

pub use audit_log::JsonlAuditSink;
pub use config::{AccountConfig, BotConfig, DataConfig};
pub use cycle::{
    run_account_cycle, run_account_cycle_with, run_all_accounts, AccountHandle, AccountRun,
    CycleReport, ErrorNote, SymbolAction, SymbolReport,
};
pub use data::{load_bars_dir, load_csv_bars, seed_paper_broker, synthetic_bars, synthetic_end};
pub use error::RunnerError;
pub use report::{daily_summary, render_report, DailySummary};
pub use state::StateStore;
