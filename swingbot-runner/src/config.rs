//! Bot configuration file.
//!
//! TOML by default; a `.json` extension is parsed as JSON. Every section has
//! serde defaults, so a file only needs to name what it overrides.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use swingbot_core::domain::Timeframe;
use swingbot_core::execution::ExecutionConfig;
use swingbot_core::risk::RiskConfig;
use swingbot_core::signals::SignalConfig;
use swingbot_core::sizing::SizingConfig;
use swingbot_core::ConfigError;

use crate::error::RunnerError;

/// Which bars are requested each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub timeframe: Timeframe,
    /// Bars requested per symbol. Must cover the strategy's minimum window.
    pub bar_limit: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Hour,
            bar_limit: 60,
        }
    }
}

/// One brokerage account the cycle runs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    /// Overrides the top-level symbol list for this account.
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    /// Starting cash when the account is backed by the paper broker.
    #[serde(default = "default_paper_cash")]
    pub paper_cash: f64,
}

fn default_paper_cash() -> f64 {
    100_000.0
}

impl AccountConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: None,
            paper_cash: default_paper_cash(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbols: Vec<String>,
    pub data: DataConfig,
    pub strategy: SignalConfig,
    pub sizing: SizingConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub accounts: Vec<AccountConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["SPY".to_string()],
            data: DataConfig::default(),
            strategy: SignalConfig::default(),
            sizing: SizingConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            accounts: vec![AccountConfig::new("paper")],
        }
    }
}

impl BotConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let text = std::fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&text).map_err(|e| RunnerError::parse(path, e))?
        } else {
            Self::from_toml_str(&text).map_err(|e| RunnerError::parse(path, e))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Every threshold, in section order. The first failure wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() && self.accounts.iter().any(|a| a.symbols.is_none()) {
            return Err(ConfigError::invalid("symbols", "must not be empty"));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::invalid("symbols", "contains an empty symbol"));
        }

        let min_bars = self.strategy.indicators.min_bars();
        if self.data.bar_limit < min_bars {
            return Err(ConfigError::invalid(
                "data.bar_limit",
                format!("must be >= {min_bars} to cover the strategy windows"),
            ));
        }

        self.strategy.validate()?;
        self.sizing.validate()?;
        self.risk.validate()?;
        self.execution.validate()?;
        if self.execution.max_slippage_pct >= self.sizing.take_profit_pct {
            return Err(ConfigError::invalid(
                "execution.max_slippage_pct",
                format!(
                    "must be below sizing.take_profit_pct ({})",
                    self.sizing.take_profit_pct
                ),
            ));
        }

        if self.accounts.is_empty() {
            return Err(ConfigError::Missing("accounts".to_string()));
        }
        let mut seen = BTreeSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(ConfigError::invalid("accounts.name", "must not be empty"));
            }
            if !seen.insert(account.name.as_str()) {
                return Err(ConfigError::invalid(
                    "accounts.name",
                    format!("duplicate account `{}`", account.name),
                ));
            }
            if account.symbols.as_ref().is_some_and(|s| s.is_empty()) {
                return Err(ConfigError::invalid(
                    format!("accounts.{}.symbols", account.name),
                    "must not be empty when given",
                ));
            }
            if !(account.paper_cash.is_finite() && account.paper_cash >= 0.0) {
                return Err(ConfigError::invalid(
                    format!("accounts.{}.paper_cash", account.name),
                    "must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Symbols traded by `account`, falling back to the top-level list.
    pub fn symbols_for<'a>(&'a self, account: &'a AccountConfig) -> &'a [String] {
        account.symbols.as_deref().unwrap_or(&self.symbols)
    }

    /// Every symbol any account trades, deduplicated, in first-seen order.
    pub fn all_symbols(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for account in &self.accounts {
            for s in self.symbols_for(account) {
                if seen.insert(s.clone()) {
                    out.push(s.clone());
                }
            }
        }
        out
    }

    /// BLAKE3 over the canonical JSON form. Identical thresholds give the
    /// same fingerprint.
    pub fn fingerprint(&self) -> String {
        // Struct fields serialize in declaration order and maps are BTreeMaps,
        // so the JSON text is canonical.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
