use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    BackendCapabilities, BatchRequest, BatchTranslation, DocumentTranslation, TranslationBackend,
};
use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;

/// Status polls before a document translation is abandoned
const DOCUMENT_POLL_ATTEMPTS: u32 = 60;

/// Wait between status polls
const DOCUMENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// DeepL text and document translation client
#[derive(Debug)]
pub struct DeepLBackend {
    /// HTTP client for making requests
    client: Client,
    /// `DeepL-Auth-Key` value
    api_key: String,
    /// API base URL, e.g. `https://api.deepl.com/v2`
    endpoint: String,
    /// Wait between status polls
    poll_interval: Duration,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: Vec<&'a str>,
    target_lang: String,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    translations: Vec<TextTranslation>,
}

#[derive(Debug, Deserialize)]
struct TextTranslation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DocumentHandle {
    document_id: String,
    document_key: String,
}

#[derive(Debug, Serialize)]
struct DocumentKeyBody<'a> {
    document_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct DocumentStatus {
    status: String,
    #[serde(default)]
    billed_characters: Option<u64>,
    #[serde(default)]
    error_message: Option<String>,
}

impl DeepLBackend {
    /// Create a backend from provider settings
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: config.api_key.clone(),
            endpoint: config.effective_endpoint(),
            poll_interval: DOCUMENT_POLL_INTERVAL,
        }
    }

    /// Override the document status poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// DeepL wants upper-case targets (`PT-BR`, `DE`)
    fn target_lang(language: &str) -> String {
        language.trim().to_uppercase()
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
    }

    async fn checked(response: Response, what: &str) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        error!("DeepL {} error ({}): {}", what, status, error_text);
        Err(ProviderError::from_status(status.as_u16(), error_text))
    }

    /// One `/translate` call for the whole batch; DeepL answers in input order
    async fn translate_texts(&self, texts: &[String], target_lang: &str) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/translate", self.endpoint);
        let body = TextRequest {
            text: texts.iter().map(String::as_str).collect(),
            target_lang: target_lang.to_string(),
        };

        let response = self.authorized(self.client.post(&url)).json(&body).send().await?;
        let response = Self::checked(response, "translate").await?;
        let parsed: TextResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if parsed.translations.is_empty() && !texts.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}

#[async_trait]
impl TranslationBackend for DeepLBackend {
    fn name(&self) -> &str {
        "DeepL"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::batch_and_document()
    }

    async fn translate_batch(&self, request: BatchRequest) -> Result<BatchTranslation, ProviderError> {
        if request.is_recovery() {
            debug!("DeepL ignores partial results; translating the batch again");
        }

        let target_lang = Self::target_lang(&request.target_language);
        let usage = request.texts.iter().map(|t| t.chars().count() as u64).sum();

        let texts = self.translate_texts(&request.texts, &target_lang).await?;

        Ok(BatchTranslation { texts, usage })
    }

    async fn translate_document(
        &self,
        document: &str,
        target_language: &str,
    ) -> Result<DocumentTranslation, ProviderError> {
        let target_lang = Self::target_lang(target_language);

        let file = Part::bytes(document.as_bytes().to_vec())
            .file_name("subtitle.srt")
            .mime_str("application/x-subrip")
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let form = Form::new().part("file", file).text("target_lang", target_lang);

        let url = format!("{}/document", self.endpoint);
        let response = self.authorized(self.client.post(&url)).multipart(form).send().await?;
        let handle: DocumentHandle = Self::checked(response, "document upload")
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        debug!("DeepL accepted document {}", handle.document_id);

        let key_body = DocumentKeyBody {
            document_key: &handle.document_key,
        };
        let status_url = format!("{}/document/{}", self.endpoint, handle.document_id);

        let mut billed = None;
        let mut done = false;
        for _ in 0..DOCUMENT_POLL_ATTEMPTS {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .authorized(self.client.post(&status_url))
                .json(&key_body)
                .send()
                .await?;
            let status: DocumentStatus = Self::checked(response, "status check")
                .await?
                .json()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;

            match status.status.as_str() {
                "done" => {
                    billed = status.billed_characters;
                    done = true;
                    break;
                }
                "error" => {
                    let message = status
                        .error_message
                        .unwrap_or_else(|| "document translation failed".to_string());
                    warn!("DeepL document {} failed: {}", handle.document_id, message);
                    return Err(ProviderError::ApiError {
                        status_code: 500,
                        message,
                    });
                }
                _ => {}
            }
        }

        if !done {
            return Err(ProviderError::Timeout {
                seconds: self.poll_interval.as_secs() * DOCUMENT_POLL_ATTEMPTS as u64,
            });
        }

        let result_url = format!("{}/result", status_url);
        let response = self
            .authorized(self.client.post(&result_url))
            .json(&key_body)
            .send()
            .await?;
        let translated = Self::checked(response, "download")
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(DocumentTranslation {
            document: translated,
            usage: billed.unwrap_or_else(|| document.chars().count() as u64),
        })
    }
}
