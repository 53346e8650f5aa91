use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::prompts::{batch_prompt, parse_texts_response, recovery_prompt};
use super::{BackendCapabilities, BatchRequest, BatchTranslation, TranslationBackend};
use crate::app_config::{ProviderConfig, ProviderKind};
use crate::errors::ProviderError;

/// Client for OpenAI chat completions and servers speaking the same protocol
/// (Gemini's OpenAI endpoint, OpenRouter, Groq, Together AI, custom hosts)
#[derive(Debug)]
pub struct OpenAiCompatibleBackend {
    /// Provider kind, for logs
    kind: ProviderKind,
    /// HTTP client for making requests
    client: Client,
    /// API key; omitted from requests when empty
    api_key: String,
    /// Base URL without trailing slash
    endpoint: String,
    /// Model name
    model: String,
    /// Sampling temperature
    temperature: f32,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub temperature: f32,
}

/// Single chat message
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Requested output format
#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub total_tokens: u64,
}

impl OpenAiCompatibleBackend {
    /// Create a backend from provider settings
    pub fn new(config: &ProviderConfig, temperature: f32) -> Self {
        Self {
            kind: config.provider_type,
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: config.api_key.clone(),
            endpoint: config.effective_endpoint(),
            model: config.effective_model(),
            temperature,
        }
    }

    async fn complete(&self, prompt: String) -> Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
            temperature: self.temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("{} API error ({}): {}", self.kind.display_name(), status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl TranslationBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        self.kind.display_name()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::batch_only()
    }

    async fn translate_batch(&self, request: BatchRequest) -> Result<BatchTranslation, ProviderError> {
        let prompt = match &request.partial {
            Some(partial) => recovery_prompt(&request.texts, partial, &request.target_language),
            None => batch_prompt(&request.texts, &request.target_language),
        };

        let response = self.complete(prompt).await?;
        let usage = response.usage.map(|u| u.total_tokens).unwrap_or(0);
        let texts = read_texts(response.choices).map_err(|e| e.billed(usage))?;

        debug!(
            "{} returned {} of {} texts ({} tokens)",
            self.name(),
            texts.len(),
            request.texts.len(),
            usage
        );

        Ok(BatchTranslation { texts, usage })
    }
}

/// Translated texts from the first choice
fn read_texts(choices: Vec<ChatChoice>) -> Result<Vec<String>, ProviderError> {
    let content = choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or(ProviderError::EmptyResponse)?;

    let texts = parse_texts_response(&content)?;
    if texts.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(texts)
}
