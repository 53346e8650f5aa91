/*!
 * Translation backends.
 *
 * Every provider implements one uniform capability contract:
 * - `BatchText`: translate an ordered list of strings into a list of the same length
 * - `Document`: optionally translate a whole SRT document in one call
 *
 * The orchestrator picks a mode by looking at `capabilities()`, never by
 * matching on the provider name. Implementations:
 * - `openai`: OpenAI chat completions and compatible servers
 * - `deepl`: DeepL text and document APIs
 * - `mock`: scripted backend for tests and benchmarks
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::errors::ProviderError;

pub mod deepl;
pub mod mock;
pub mod openai;
pub mod prompts;
pub mod registry;

pub use registry::BackendRegistry;

/// How a backend can translate a subtitle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranslationMode {
    /// Ordered batch of cue texts
    BatchText,
    /// Whole document in, whole document out
    Document,
}

/// Modes a backend offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub modes: Vec<TranslationMode>,
}

impl BackendCapabilities {
    pub fn batch_only() -> Self {
        Self {
            modes: vec![TranslationMode::BatchText],
        }
    }

    pub fn batch_and_document() -> Self {
        Self {
            modes: vec![TranslationMode::BatchText, TranslationMode::Document],
        }
    }

    pub fn supports(&self, mode: TranslationMode) -> bool {
        self.modes.contains(&mode)
    }
}

/// One batch translation call
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Source texts in cue order
    pub texts: Vec<String>,
    /// Target language code
    pub target_language: String,
    /// Misaligned answer of an earlier attempt; makes this a recovery request
    pub partial: Option<Vec<String>>,
}

impl BatchRequest {
    pub fn new(texts: Vec<String>, target_language: impl Into<String>) -> Self {
        Self {
            texts,
            target_language: target_language.into(),
            partial: None,
        }
    }

    /// Same request asking the backend to reconcile a partial answer
    pub fn recovery(mut self, partial: Vec<String>) -> Self {
        self.partial = Some(partial);
        self
    }

    pub fn is_recovery(&self) -> bool {
        self.partial.is_some()
    }
}

/// Answer of a batch call; `texts` may have the wrong length
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTranslation {
    pub texts: Vec<String>,
    /// Provider-specific usage cost (tokens or billed characters)
    pub usage: u64,
}

/// Answer of a document call
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTranslation {
    pub document: String,
    pub usage: u64,
}

/// Common trait for all translation backends
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Modes this backend offers
    fn capabilities(&self) -> BackendCapabilities;

    /// Translate an ordered batch of texts
    async fn translate_batch(&self, request: BatchRequest) -> Result<BatchTranslation, ProviderError>;

    /// Translate a whole SRT document
    async fn translate_document(
        &self,
        _document: &str,
        _target_language: &str,
    ) -> Result<DocumentTranslation, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} does not translate documents",
            self.name()
        )))
    }
}
