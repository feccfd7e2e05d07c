//! OpenRouter connector (OpenAI-compatible chat completions API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{GeneratorError, Message, PlanGenerator, Prompt};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Per-request HTTP timeout. The lifecycle service applies its own,
    /// usually shorter, deadline on top.
    pub request_timeout: Duration,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: Option<i64>,
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Generator backed by the OpenRouter chat completions endpoint.
pub struct OpenRouterGenerator {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterGenerator {
    /// Fails when the API key is blank or the HTTP client cannot be built.
    pub fn new(config: OpenRouterConfig) -> Result<Self, GeneratorError> {
        if config.api_key.trim().is_empty() {
            error!("OpenRouter API key is required but not provided");
            return Err(GeneratorError::Failed("OpenRouter API key is required".to_string()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GeneratorError::Failed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for OpenRouterGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterGenerator")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl PlanGenerator for OpenRouterGenerator {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError> {
        let model = self.config.model.as_str();
        info!(
            model,
            message_count = prompt.messages.len(),
            max_tokens = ?prompt.max_tokens,
            temperature = ?prompt.temperature,
            "starting OpenRouter request"
        );

        let body = CompletionRequest {
            model,
            messages: &prompt.messages,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(model, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            warn!(model, status = status.as_u16(), %message, "OpenRouter request rejected");
            return Err(classify_status(status, message));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout
            } else {
                GeneratorError::Failed(format!("failed to parse completion: {e}"))
            }
        })?;

        let finish_reason = completion
            .choices
            .first()
            .and_then(|c| c.finish_reason.clone());
        match &completion.usage {
            Some(usage) => info!(
                model = completion.model.as_deref().unwrap_or(model),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                total_tokens = usage.total_tokens,
                finish_reason = ?finish_reason,
                "OpenRouter request completed"
            ),
            None => info!(
                model = completion.model.as_deref().unwrap_or(model),
                finish_reason = ?finish_reason,
                "OpenRouter request completed"
            ),
        }

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                error!(model, "empty response from OpenRouter");
                GeneratorError::Failed("empty response from AI service".to_string())
            })
    }
}

fn classify_transport_error(model: &str, err: reqwest::Error) -> GeneratorError {
    if err.is_timeout() {
        warn!(model, "OpenRouter request timed out");
        GeneratorError::Timeout
    } else if err.is_connect() {
        warn!(model, error = %err, "OpenRouter connection failed");
        GeneratorError::Unavailable(err.to_string())
    } else {
        error!(model, error = %err, "unexpected error during OpenRouter request");
        GeneratorError::Failed(err.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> GeneratorError {
    let unavailable = status.is_server_error()
        || matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        );
    let detail = format!("HTTP {}: {message}", status.as_u16());
    if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
        GeneratorError::Timeout
    } else if unavailable {
        GeneratorError::Unavailable(detail)
    } else {
        GeneratorError::Failed(detail)
    }
}
