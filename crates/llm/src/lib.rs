//! Chatline completion capability
//!
//! Provides text completion for assistant replies with support for:
//! - Anthropic Messages API
//! - Google Gemini `generateContent` API
//! - Mock service for testing and local development
//!
//! One client is built at start-up by [`LlmServiceFactory`] and shared as
//! `Arc<dyn LlmService>` across every request.

pub mod anthropic;
pub mod gemini;
pub mod mock;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mock::{MockBehavior, MockLlmService};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM configuration error: {0}")]
    Configuration(String),

    #[error("LLM request error: {0}")]
    Request(String),

    #[error("LLM response error: {0}")]
    Response(String),

    #[error("LLM rate limit exceeded")]
    RateLimit,

    #[error("LLM quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("LLM request timed out")]
    Timeout,
}

impl LlmError {
    /// Whether the provider refused the call because of rate, quota, or billing limits
    pub fn is_quota(&self) -> bool {
        match self {
            LlmError::RateLimit | LlmError::QuotaExceeded(_) => true,
            LlmError::Response(message) => mentions_quota(message),
            _ => false,
        }
    }
}

/// Heuristic for provider error bodies that signal exhausted limits
pub(crate) fn mentions_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429")
        || lower.contains("quota")
        || lower.contains("billing")
        || lower.contains("resource_exhausted")
        || lower.contains("credit balance")
}

/// Conversation role understood by the completion providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    User,
    Assistant,
}

/// One turn of the prompt history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
        }
    }
}

/// Completion request handed to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Provider model; empty selects the service default
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Completion result returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub stop_reason: String,
}

/// LLM service configuration
#[derive(Clone)]
pub struct LlmConfig {
    /// Provider (anthropic, gemini, mock)
    pub provider: String,
    pub api_key: String,
    pub default_model: String,
    /// Output cap used when a request does not set one
    pub max_tokens: u32,
    pub base_url: Option<String>,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmConfig {
    /// Create LLM config from environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        dotenvy::dotenv().ok();

        let provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let api_key = std::env::var("LLM_API_KEY").unwrap_or_default();

        if provider != "mock" && api_key.is_empty() {
            return Err(LlmError::Configuration(format!(
                "LLM_API_KEY is required for {} provider",
                provider
            )));
        }

        let default_model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| default_model_for(&provider).to_string());

        let max_tokens = match std::env::var("LLM_MAX_TOKENS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| LlmError::Configuration("LLM_MAX_TOKENS must be a number".into()))?,
            Err(_) => 1024,
        };

        let timeout_secs: u64 = match std::env::var("LLM_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                LlmError::Configuration("LLM_TIMEOUT_SECS must be a number".into())
            })?,
            Err(_) => 60,
        };

        Ok(Self {
            provider,
            api_key,
            default_model,
            max_tokens,
            base_url: std::env::var("LLM_BASE_URL").ok(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Configuration for the mock provider
    pub fn mock() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: String::new(),
            default_model: default_model_for("mock").to_string(),
            max_tokens: 1024,
            base_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "claude-sonnet-4-5-20250929",
        "gemini" => "gemini-2.0-flash",
        _ => "mock-model",
    }
}

/// LLM service trait for different implementations
#[async_trait::async_trait]
pub trait LlmService: Send + Sync {
    /// Produce one completion for the given history
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model used when a request leaves `model` empty
    fn default_model(&self) -> &str;
}

/// Factory for creating LlmService implementations
pub struct LlmServiceFactory;

impl LlmServiceFactory {
    /// Create an LlmService based on configuration
    pub fn create(config: LlmConfig) -> Result<Box<dyn LlmService>, LlmError> {
        match config.provider.as_str() {
            "anthropic" => {
                tracing::info!(model = %config.default_model, "Creating Anthropic LLM service");
                Ok(Box::new(anthropic::AnthropicService::new(config)?))
            }
            "gemini" => {
                tracing::info!(model = %config.default_model, "Creating Gemini LLM service");
                Ok(Box::new(gemini::GeminiService::new(config)?))
            }
            "mock" => {
                tracing::info!("Creating mock LLM service");
                Ok(Box::new(mock::MockLlmService::new()))
            }
            provider => Err(LlmError::Configuration(format!(
                "Unknown LLM provider: {}. Supported providers: anthropic, gemini, mock",
                provider
            ))),
        }
    }
}
