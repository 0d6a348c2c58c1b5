//! Judge capability
//!
//! A judge takes a rendered prompt and returns a parsed JSON object. Retry,
//! rate limiting, schema validation and caching are decorators implementing
//! the same trait, stacked by [`JudgeStack`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use eeat_core::{CacheError, CacheKey, DeadlineExceeded, PinSet};

use crate::{GenerationOptions, LlmError, PromptError, SharedBackend};

/// Expected shape of a judge response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    Evaluation,
    Recommendations { with_draft: bool },
}

/// A fully rendered judge call
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    /// Page the call is about, for logs
    pub url: String,
    pub system: String,
    pub user: String,
    pub schema: ResponseSchema,
    pub cache_key: CacheKey,
    pub options: GenerationOptions,
    /// Cache pins taken for this call live as long as the page run holding
    /// this set
    pub pins: PinSet,
}

impl JudgeRequest {
    /// Key over everything that shapes the answer: both prompts, the prompt
    /// version and the model
    pub fn derive_key(
        url: &str,
        system: &str,
        user: &str,
        prompt_version: &str,
        model: &str,
    ) -> CacheKey {
        CacheKey::derive(
            url,
            &format!("{}\0{}", system, user),
            &format!("{}@{}", prompt_version, model),
        )
    }

    /// Hold this call's cache pins in `pins`
    pub fn pinned_by(mut self, pins: &PinSet) -> Self {
        self.pins = pins.clone();
        self
    }

    /// Same call with a corrective instruction appended
    pub fn with_correction(&self, note: &str) -> Self {
        Self {
            user: format!("{}\n\n{}", self.user, note),
            ..self.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("transient judge failure after {attempts} attempt(s): {message}")]
    Transient { message: String, attempts: u32 },

    #[error("judge response violates schema: {0}")]
    SchemaViolation(String),

    #[error("judge rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

impl JudgeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, JudgeError::Transient { .. })
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self, JudgeError::SchemaViolation(_))
    }

    /// A cache key collision must stop the whole run
    pub fn is_cache_collision(&self) -> bool {
        matches!(self, JudgeError::Cache(CacheError::KeyCollision { .. }))
    }
}

impl From<LlmError> for JudgeError {
    fn from(error: LlmError) -> Self {
        if error.is_transient() {
            JudgeError::Transient {
                message: error.to_string(),
                attempts: 1,
            }
        } else {
            JudgeError::Rejected(error.to_string())
        }
    }
}

/// Capability to evaluate a prompt into structured JSON
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError>;
}

/// Thread-safe reference to a judge
pub type SharedJudge = Arc<dyn Judge>;

/// Strip markdown fences and take the outermost `{...}` of a completion
pub fn extract_json(raw: &str) -> Result<Value, JudgeError> {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = text.split_once('\n').map_or("", |(_, rest)| rest);
        text = text.rsplit_once("```").map_or(text, |(body, _)| body).trim();
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return object_or_violation(value);
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str::<Value>(&text[start..=end])
            .map_err(|e| JudgeError::SchemaViolation(format!("invalid JSON: {}", e)))
            .and_then(object_or_violation),
        _ => Err(JudgeError::SchemaViolation(
            "response contains no JSON object".to_string(),
        )),
    }
}

fn object_or_violation(value: Value) -> Result<Value, JudgeError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(JudgeError::SchemaViolation(
            "response is not a JSON object".to_string(),
        ))
    }
}

/// Innermost judge: one backend call, no retries
pub struct BackendJudge {
    backend: SharedBackend,
}

impl BackendJudge {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Judge for BackendJudge {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        debug!(
            url = %request.url,
            model = self.backend.model_name(),
            "Calling judge"
        );
        let raw = self
            .backend
            .generate(&request.system, &request.user, &request.options)
            .await?;
        extract_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_fenced_json() {
        let raw = "```json\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_extract_embedded_object() {
        let raw = "Here you go: {\"a\": {\"b\": true}} hope it helps";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": {"b": true}}));
    }

    #[test]
    fn test_non_json_is_schema_violation() {
        assert!(extract_json("sorry, I can't").unwrap_err().is_schema_violation());
        assert!(extract_json("[1, 2]").unwrap_err().is_schema_violation());
        assert!(extract_json("{broken").unwrap_err().is_schema_violation());
    }

    #[test]
    fn test_key_covers_system_prompt_and_model() {
        let base = JudgeRequest::derive_key("u", "system", "user", "evaluate@1", "gpt-4o");
        assert_eq!(
            base,
            JudgeRequest::derive_key("u", "system", "user", "evaluate@1", "gpt-4o")
        );
        assert_ne!(
            base,
            JudgeRequest::derive_key("u", "stricter system", "user", "evaluate@1", "gpt-4o")
        );
        assert_ne!(
            base,
            JudgeRequest::derive_key("u", "system", "user", "evaluate@1", "claude-sonnet")
        );
        assert_ne!(
            base,
            JudgeRequest::derive_key("u", "system", "user", "evaluate@2", "gpt-4o")
        );
    }

    #[test]
    fn test_llm_error_mapping() {
        assert!(JudgeError::from(LlmError::RateLimited).is_transient());
        assert!(matches!(
            JudgeError::from(LlmError::Rejected {
                status: 401,
                message: "no".into()
            }),
            JudgeError::Rejected(_)
        ));
    }
}
