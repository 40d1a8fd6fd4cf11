//! Daily performance summary per account.

use std::fmt;

use serde::{Deserialize, Serialize};

use swingbot_core::domain::AccountSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub account: String,
    pub equity: f64,
    pub last_equity: f64,
    pub daily_pnl: f64,
    /// Percent, not fraction. `None` when there is no prior close.
    pub daily_pnl_pct: Option<f64>,
    pub buying_power: f64,
}

pub fn daily_summary(account_name: &str, account: &AccountSnapshot) -> DailySummary {
    DailySummary {
        account: account_name.to_string(),
        equity: account.equity,
        last_equity: account.last_equity,
        daily_pnl: account.daily_pnl(),
        daily_pnl_pct: account.daily_pnl_pct().map(|p| p * 100.0),
        buying_power: account.buying_power,
    }
}

impl fmt::Display for DailySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Account {}:", self.account)?;
        writeln!(f, "Total Equity: ${}", money(self.equity))?;
        match self.daily_pnl_pct {
            Some(pct) => writeln!(f, "Daily P/L: ${} ({pct:+.2}%)", money(self.daily_pnl))?,
            None => writeln!(f, "Daily P/L: ${} (n/a)", money(self.daily_pnl))?,
        }
        writeln!(f, "Buying Power: ${}", money(self.buying_power))?;
        write!(f, "{}", "-".repeat(39))
    }
}

/// Plain-text report over several accounts.
pub fn render_report(summaries: &[DailySummary]) -> String {
    let mut out = String::from("--- Daily Performance Report ---\n\n");
    for s in summaries {
        out.push_str(&s.to_string());
        out.push('\n');
    }
    out
}

/// Two decimals with thousands separators: `-1,234.50`.
fn money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}
