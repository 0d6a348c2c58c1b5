//! LLM backend abstraction
//!
//! Supports OpenAI-compatible APIs and Anthropic Claude. Backend errors are
//! classified as transient (worth retrying) or fatal.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Per-request HTTP timeout for judge calls
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

/// LLM backend errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Empty response")]
    EmptyResponse,

    #[error("Temporary backend failure: {0}")]
    Unavailable(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl LlmError {
    /// Timeouts, connection failures, rate limits, 5xx and empty completions
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited | LlmError::EmptyResponse | LlmError::Unavailable(_)
        )
    }

    /// Classify an HTTP status from a judge API
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => LlmError::RateLimited,
            500..=599 => LlmError::Unavailable(format!("status {}: {}", status, message)),
            _ => LlmError::Rejected { status, message },
        }
    }
}

/// Sampling parameters for a single call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u16,
    /// Ask the backend for a JSON object response when it supports it
    pub json_mode: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 2048,
            json_mode: true,
        }
    }
}

/// Generic LLM backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a completion with system prompt
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible backend configuration
#[derive(Debug, Clone)]
pub struct OpenAIBackendConfig {
    /// API key
    pub api_key: String,
    /// Base URL (for OpenRouter, local servers, etc.)
    pub base_url: Option<String>,
    /// Model name
    pub model: String,
    /// Whole-request timeout, connection included
    pub timeout_secs: u64,
}

impl Default for OpenAIBackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl OpenAIBackendConfig {
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn openrouter(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: Some("https://openrouter.ai/api/v1".to_string()),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn local(base_url: &str, model: &str) -> Self {
        Self {
            api_key: "sk-local".to_string(),
            base_url: Some(base_url.to_string()),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))
}

/// OpenAI-compatible LLM backend
pub struct OpenAIBackend {
    client: Client<OpenAIConfig>,
    config: OpenAIBackendConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIBackendConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Config("missing API key".to_string()));
        }

        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let client = Client::with_config(openai_config)
            .with_http_client(http_client(config.timeout_secs)?);

        Ok(Self { client, config })
    }
}

fn classify_openai_error(error: OpenAIError) -> LlmError {
    match error {
        OpenAIError::Reqwest(e) => LlmError::Unavailable(e.to_string()),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            let code = api.code.as_deref().unwrap_or_default();
            if code == "rate_limit_exceeded" || kind == "rate_limit_error" || kind == "requests" {
                LlmError::RateLimited
            } else if kind == "server_error" || kind == "overloaded_error" {
                LlmError::Unavailable(api.message)
            } else {
                LlmError::Rejected {
                    status: 400,
                    message: api.message,
                }
            }
        }
        OpenAIError::JSONDeserialize(e) => LlmError::Unavailable(e.to_string()),
        other => LlmError::Api(other.to_string()),
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| LlmError::Api(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| LlmError::Api(e.to_string()))?,
            ),
        ];

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.config.model)
            .messages(messages)
            .temperature(options.temperature)
            .max_tokens(options.max_tokens);
        if options.json_mode {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let request = builder.build().map_err(|e| LlmError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Anthropic Claude backend configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key
    pub api_key: String,
    /// Model name (e.g., claude-3-5-sonnet-20241022)
    pub model: String,
    /// API root, without the `/v1/messages` path
    pub base_url: String,
    /// Whole-request timeout, connection included
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Anthropic Claude backend
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Config("missing API key".to_string()));
        }
        let client = http_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": u32::from(options.max_tokens),
            "temperature": options.temperature,
            "system": system,
            "messages": [
                {"role": "user", "content": user}
            ]
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        json["content"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|block| block["text"].as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Thread-safe reference to an LLM backend
pub type SharedBackend = Arc<dyn LlmBackend>;

/// Create a shared OpenAI-compatible backend
pub fn create_backend(config: OpenAIBackendConfig) -> Result<SharedBackend, LlmError> {
    Ok(Arc::new(OpenAIBackend::new(config)?))
}

/// Create a shared Anthropic backend
pub fn create_anthropic_backend(config: AnthropicConfig) -> Result<SharedBackend, LlmError> {
    Ok(Arc::new(AnthropicBackend::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_status_classification() {
        assert!(LlmError::from_status(429, String::new()).is_transient());
        assert!(LlmError::from_status(503, String::new()).is_transient());
        assert!(LlmError::from_status(529, "overloaded".into()).is_transient());
        assert!(!LlmError::from_status(401, "bad key".into()).is_transient());
        assert!(!LlmError::from_status(400, String::new()).is_transient());
        assert!(LlmError::EmptyResponse.is_transient());
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let result = AnthropicBackend::new(AnthropicConfig::new("", "claude"));
        assert!(matches!(result, Err(LlmError::Config(_))));
        let result = OpenAIBackend::new(OpenAIBackendConfig::openai("", "gpt-4o-mini"));
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 16 * 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    /// Accepts one connection and never answers
    async fn serve_stalled() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 16 * 1024];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_anthropic_stalled_server_times_out_as_transient() {
        let base = serve_stalled().await;
        let backend = AnthropicBackend::new(
            AnthropicConfig::new("key", "claude")
                .with_base_url(&base)
                .with_timeout(1),
        )
        .unwrap();

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            backend.generate("sys", "user", &GenerationOptions::default()),
        )
        .await
        .expect("request should time out on its own")
        .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_openai_stalled_server_times_out_as_transient() {
        let base = serve_stalled().await;
        let backend =
            OpenAIBackend::new(OpenAIBackendConfig::local(&base, "llama3").with_timeout(1)).unwrap();

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            backend.generate("sys", "user", &GenerationOptions::default()),
        )
        .await
        .expect("request should time out on its own")
        .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_anthropic_text_block() {
        let base = serve_once("200 OK", r#"{"content":[{"type":"text","text":"{\"ok\":true}"}]}"#).await;
        let backend =
            AnthropicBackend::new(AnthropicConfig::new("key", "claude").with_base_url(&base)).unwrap();

        let text = backend
            .generate("sys", "user", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_anthropic_overloaded_is_transient() {
        let base = serve_once("529 Overloaded", r#"{"type":"error"}"#).await;
        let backend =
            AnthropicBackend::new(AnthropicConfig::new("key", "claude").with_base_url(&base)).unwrap();

        let err = backend
            .generate("sys", "user", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_anthropic_auth_failure_is_fatal() {
        let base = serve_once("401 Unauthorized", r#"{"type":"error"}"#).await;
        let backend =
            AnthropicBackend::new(AnthropicConfig::new("key", "claude").with_base_url(&base)).unwrap();

        let err = backend
            .generate("sys", "user", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Rejected { status: 401, .. }));
    }
}
