//! Page and run failures

use std::path::PathBuf;
use thiserror::Error;

use eeat_agents::{JudgeError, PromptError};
use eeat_core::{CacheError, ConfigError, PreprocessError, ScoreError};
use eeat_web::FetchError;

/// Why one page did not produce a report. The run continues.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Content(#[from] PreprocessError),

    #[error(transparent)]
    Judge(JudgeError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("page timed out")]
    TimedOut,
}

impl From<JudgeError> for PageError {
    fn from(error: JudgeError) -> Self {
        match error {
            JudgeError::Deadline(_) => PageError::TimedOut,
            other => PageError::Judge(other),
        }
    }
}

impl PageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::TimedOut)
    }

    pub fn is_cache_collision(&self) -> bool {
        matches!(self, PageError::Judge(e) if e.is_cache_collision())
    }
}

/// Failures that stop a whole run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid scoring config: {0}")]
    Scoring(#[from] ConfigError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("aborting run: cache key collision on {url}: {source}")]
    CacheCollision { url: String, source: JudgeError },

    #[error("failed to write {path}: {source}")]
    Export {
        path: PathBuf,
        source: std::io::Error,
    },
}
