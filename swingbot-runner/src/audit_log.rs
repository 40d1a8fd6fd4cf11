//! Append-only JSON-lines audit log.
//!
//! One `TradeAuditRecord` per line. Each line stands alone, so a crash
//! mid-write loses at most the last record.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use swingbot_core::audit::{AuditSink, TradeAuditRecord};

pub struct JsonlAuditSink {
    path: PathBuf,
    // Serializes appends from one process.
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &TradeAuditRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()
    }

    /// Every parseable record in the file. Malformed lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<TradeAuditRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut out = Vec::new();
        for (i, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => out.push(record),
                Err(e) => warn!(path = %self.path.display(), line = i + 1, error = %e, "skipping malformed audit line"),
            }
        }
        Ok(out)
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: &TradeAuditRecord) {
        if let Err(e) = self.append(record) {
            warn!(path = %self.path.display(), error = %e, "failed to append audit record");
        }
    }
}
