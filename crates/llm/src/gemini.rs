//! Google Gemini API Implementation
//!
//! Calls `models/{model}:generateContent` on the Generative Language API.
//! Gemini names the assistant side of a chat `model`.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    mentions_quota, CompletionRequest, CompletionResponse, LlmConfig, LlmError, LlmRole,
    LlmService,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    status: String,
    message: String,
}

/// Gemini LLM service implementation
pub struct GeminiService {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl GeminiService {
    /// Create a new Gemini service
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }
}

fn text_content(role: Option<&str>, text: String) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part { text: Some(text) }],
    }
}

fn build_request(request: CompletionRequest, default_max_tokens: u32) -> GenerateRequest {
    let contents = request
        .messages
        .into_iter()
        .map(|m| {
            let role = match m.role {
                LlmRole::User => "user",
                LlmRole::Assistant => "model",
            };
            text_content(Some(role), m.content)
        })
        .collect();

    GenerateRequest {
        system_instruction: request.system_prompt.map(|s| text_content(None, s)),
        contents,
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens.unwrap_or(default_max_tokens),
            temperature: request.temperature,
        },
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimit;
    }

    if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
        let ApiError { status: code, message } = error_response.error;
        if code == "RESOURCE_EXHAUSTED" || mentions_quota(&message) {
            return LlmError::QuotaExceeded(message);
        }
        return LlmError::Response(format!("Gemini API error ({}): {}", code, message));
    }

    LlmError::Response(format!("Gemini API returned {}: {}", status, body))
}

#[async_trait::async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model.clone()
        };

        let body = build_request(request, self.config.max_tokens);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        tracing::debug!(
            model = %model,
            max_tokens = %body.generation_config.max_output_tokens,
            "Sending Gemini API request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Request(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(classify_error(status, &error_body));
        }

        let api_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to parse response: {}", e)))?;

        Ok(into_completion(api_response, model))
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }
}

fn into_completion(api_response: GenerateResponse, requested_model: String) -> CompletionResponse {
    let candidate = api_response.candidates.into_iter().next();

    let stop_reason = candidate
        .as_ref()
        .and_then(|c| c.finish_reason.clone())
        .unwrap_or_else(|| "STOP".to_string());

    let content = candidate
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let (input_tokens, output_tokens) = api_response
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    CompletionResponse {
        content,
        model: api_response.model_version.unwrap_or(requested_model),
        input_tokens,
        output_tokens,
        stop_reason,
    }
}
