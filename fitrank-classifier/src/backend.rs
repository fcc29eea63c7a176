//! LLM backend abstraction
//!
//! Supports OpenAI-compatible APIs (OpenAI, OpenRouter, local servers) and
//! Anthropic Claude.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use fitrank_core::ErrorCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

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
}

impl LlmError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LlmError::RateLimited => ErrorCode::RateLimitExceeded,
            LlmError::Config(_) => ErrorCode::ValidationError,
            LlmError::Api(_) | LlmError::EmptyResponse => ErrorCode::ServiceUnavailable,
        }
    }
}

/// A chat model that answers one system+user exchange with text
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// One completion; empty answers are `EmptyResponse`
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Which API family serves the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    OpenRouter,
    Anthropic,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "openai",
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Local => "local",
        }
    }

    /// Environment variable holding this provider's key
    pub fn key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::OpenRouter => Some("OPENROUTER_API_KEY"),
            LlmProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            LlmProvider::Local => None,
        }
    }
}

/// OpenAI-compatible backend configuration
#[derive(Debug, Clone)]
pub struct OpenAIBackendConfig {
    pub api_key: String,
    /// Override for OpenRouter and local OpenAI-compatible servers
    pub base_url: Option<String>,
    pub model: String,
    /// Sampling temperature; classification runs at 0.0
    pub temperature: f32,
    /// Completion cap
    pub max_tokens: u16,
}

impl Default for OpenAIBackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            // A verdict is a single small JSON object
            max_tokens: 300,
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
}

/// OpenAI-compatible LLM backend
pub struct OpenAIBackend {
    client: Client<OpenAIConfig>,
    config: OpenAIBackendConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIBackendConfig) -> Result<Self, LlmError> {
        if config.model.trim().is_empty() {
            return Err(LlmError::Config("model name is empty".to_string()));
        }

        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let client = Client::with_config(openai_config);

        Ok(Self { client, config })
    }

    fn chat_request(&self, system: &str, user: &str) -> Result<CreateChatCompletionRequest, LlmError> {
        let build_error = |e: OpenAIError| LlmError::Config(e.to_string());

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(build_error)?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()
            .map_err(build_error)?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages([system.into(), user.into()])
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(build_error)
    }
}

/// 429s surface as API errors from async-openai
fn classify_openai_error(e: OpenAIError) -> LlmError {
    let message = e.to_string();
    if message.contains("429") || message.to_lowercase().contains("rate limit") {
        LlmError::RateLimited
    } else {
        LlmError::Api(message)
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = self.chat_request(system, user)?;
        let response = self.client.chat().create(request).await.map_err(classify_openai_error)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude backend configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    /// e.g. claude-3-5-haiku-latest
    pub model: String,
    pub max_tokens: u32,
}

impl AnthropicConfig {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens: 300,
        }
    }
}

/// Anthropic Claude backend
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("Anthropic API key is empty".to_string()));
        }
        let client = reqwest::Client::new();
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            system,
            messages: [Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(LlmError::RateLimited),
            status if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                return Err(LlmError::Api(format!("anthropic returned {}: {}", status, detail)));
            }
            _ => {}
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| LlmError::Api(e.to_string()))?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

pub type SharedBackend = Arc<dyn LlmBackend>;

/// Create a shared OpenAI-compatible backend
pub fn create_backend(config: OpenAIBackendConfig) -> Result<SharedBackend, LlmError> {
    Ok(Arc::new(OpenAIBackend::new(config)?))
}

/// Create a shared Anthropic backend
pub fn create_anthropic_backend(config: AnthropicConfig) -> Result<SharedBackend, LlmError> {
    Ok(Arc::new(AnthropicBackend::new(config)?))
}

/// Create a backend for `provider`. `base_url` is required for local servers.
pub fn create_backend_for(
    provider: LlmProvider,
    model: &str,
    api_key: Option<&str>,
    base_url: Option<&str>,
) -> Result<SharedBackend, LlmError> {
    let require_key = || {
        api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            LlmError::Config(format!(
                "{} API key required (set {})",
                provider.as_str(),
                provider.key_env().unwrap_or("an API key")
            ))
        })
    };

    match provider {
        LlmProvider::OpenAI => create_backend(OpenAIBackendConfig::openai(require_key()?, model)),
        LlmProvider::OpenRouter => create_backend(OpenAIBackendConfig::openrouter(require_key()?, model)),
        LlmProvider::Anthropic => create_anthropic_backend(AnthropicConfig::new(require_key()?, model)),
        LlmProvider::Local => {
            let base_url =
                base_url.ok_or_else(|| LlmError::Config("local provider requires a base URL".to_string()))?;
            create_backend(OpenAIBackendConfig::local(base_url, model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serde_names() {
        let provider: LlmProvider = serde_json::from_str("\"openrouter\"").unwrap();
        assert_eq!(provider, LlmProvider::OpenRouter);
        assert_eq!(LlmProvider::default().as_str(), "openai");
    }

    #[test]
    fn test_create_backend_requires_key() {
        let err = create_backend_for(LlmProvider::Anthropic, "claude-3-5-haiku-latest", None, None).err();
        assert!(matches!(err, Some(LlmError::Config(_))));

        let err = create_backend_for(LlmProvider::Local, "llama3", None, None).err();
        assert!(matches!(err, Some(LlmError::Config(_))));
    }

    #[test]
    fn test_create_local_backend() {
        let backend = create_backend_for(LlmProvider::Local, "llama3", None, Some("http://localhost:11434/v1")).unwrap();
        assert_eq!(backend.model_name(), "llama3");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LlmError::RateLimited.code(), ErrorCode::RateLimitExceeded);
        assert_eq!(LlmError::EmptyResponse.code(), ErrorCode::ServiceUnavailable);
    }
}
