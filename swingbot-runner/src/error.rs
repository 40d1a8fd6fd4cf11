//! Runner-level errors: file IO, parsing, and configuration validation.

use std::path::PathBuf;
use thiserror::Error;

use swingbot_core::ConfigError;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("bad bar data in {path} (row {row}): {reason}")]
    BadBars {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RunnerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
