//! Durable `RiskState` per account, stored as one JSON document.
//!
//! Cooldowns, trailing marks and the daily halt normally live only for the
//! process. With `--state-file` they carry over between invocations.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use swingbot_core::risk::RiskState;

use crate::error::RunnerError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStore {
    pub accounts: BTreeMap<String, RiskState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting fresh");
                return Ok(Self::default());
            }
            Err(e) => return Err(RunnerError::io(path, e)),
        };
        serde_json::from_str(&text).map_err(|e| RunnerError::parse(path, e))
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), RunnerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RunnerError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| RunnerError::parse(path, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| RunnerError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| RunnerError::io(path, e))
    }

    /// State for `account`, created empty on first use.
    pub fn account_mut(&mut self, account: &str) -> &mut RiskState {
        self.accounts.entry(account.to_string()).or_default()
    }

    pub fn account(&self, account: &str) -> Option<&RiskState> {
        self.accounts.get(account)
    }
}
