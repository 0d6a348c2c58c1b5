//! Run configuration
//!
//! One immutable [`PipelineConfig`] is threaded through a run. Every field is
//! optional in TOML; CLI flags override whatever the file sets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use eeat_agents::{RateLimit, RetryPolicy, EVALUATION_CONTENT_CHARS, RECOMMENDATION_EXCERPT_CHARS};
use eeat_core::{ResultCache, ScoringConfig, SUPPORTED_LANGUAGES};
use eeat_web::FetchConfig;

use crate::RunError;

/// Upper bound for `page_timeout_secs`; stays well below the age at which a
/// cache pin counts as abandoned
pub const MAX_PAGE_TIMEOUT_SECS: u64 = 3600;

/// Page download settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    /// Cleaned text is cut at a sentence boundary below this many chars
    pub chunk_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let defaults = FetchConfig::default();
        Self {
            timeout_secs: defaults.timeout_secs,
            max_retries: defaults.max_retries,
            retry_base_ms: defaults.retry_base_ms,
            chunk_size: defaults.chunk_size,
        }
    }
}

impl FetchSettings {
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig::default()
            .with_timeout(self.timeout_secs)
            .with_retries(self.max_retries, self.retry_base_ms)
            .with_chunk_size(self.chunk_size)
    }
}

/// How much page text goes into each prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentLimits {
    pub evaluation_chars: usize,
    pub recommendation_chars: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            evaluation_chars: EVALUATION_CONTENT_CHARS,
            recommendation_chars: RECOMMENDATION_EXCERPT_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// When off, results are cached in memory for this run only
    pub enabled: bool,
    pub dir: PathBuf,
}

impl CacheSettings {
    /// File-backed cache, or a run-local memory cache when disabled
    pub fn open(&self) -> Result<ResultCache, RunError> {
        if self.enabled {
            Ok(ResultCache::open_dir(&self.dir)?)
        } else {
            Ok(ResultCache::in_memory())
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".eeat-cache"),
        }
    }
}

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scoring: ScoringConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimit,
    /// Pages processed concurrently
    pub fan_out: usize,
    /// Wall-clock budget for one page, fetch included
    pub page_timeout_secs: u64,
    pub with_draft: bool,
    /// Skip language detection and use this code
    pub forced_language: Option<String>,
    pub limits: ContentLimits,
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
    /// Directory of prompt TOML files overriding the embedded ones
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimit::default(),
            fan_out: 4,
            page_timeout_secs: 180,
            with_draft: false,
            forced_language: None,
            limits: ContentLimits::default(),
            fetch: FetchSettings::default(),
            cache: CacheSettings::default(),
            prompts_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RunError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| RunError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        self.scoring.validate()?;

        if self.fan_out == 0 {
            return Err(RunError::InvalidConfig("fan_out must be at least 1".into()));
        }
        if self.page_timeout_secs == 0 || self.page_timeout_secs > MAX_PAGE_TIMEOUT_SECS {
            return Err(RunError::InvalidConfig(format!(
                "page_timeout_secs must be between 1 and {}",
                MAX_PAGE_TIMEOUT_SECS
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(RunError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if let Some(code) = &self.forced_language {
            let code = code.to_uppercase();
            if !SUPPORTED_LANGUAGES.contains(&code.as_str()) {
                return Err(RunError::InvalidConfig(format!(
                    "unsupported language `{}` (expected one of {})",
                    code,
                    SUPPORTED_LANGUAGES.join(", ")
                )));
            }
        }
        if self.limits.evaluation_chars == 0 || self.limits.recommendation_chars == 0 {
            return Err(RunError::InvalidConfig(
                "content limits must be positive".into(),
            ));
        }
        Ok(())
    }
}
