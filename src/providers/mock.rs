/*!
 * Mock backend implementations for testing.
 *
 * `ScriptedBackend` replays queued replies first and then falls back to a
 * behavior mode:
 * - `ScriptedBackend::working()` - Always returns one translation per text
 * - `ScriptedBackend::failing()` - Always fails with an API error
 * - `ScriptedBackend::short_by(n)` - Always returns `n` translations too few
 * - `ScriptedBackend::slow(ms)` - Working, after a delay (timeout testing)
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    BackendCapabilities, BatchRequest, BatchTranslation, DocumentTranslation, TranslationBackend,
};
use crate::errors::ProviderError;
use crate::subtitle_processor::{parse_srt, render_srt};

/// Usage reported for every successful call
pub const MOCK_USAGE_PER_CALL: u64 = 10;

/// Behavior once the script is exhausted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Always fails with an error
    Failing,
    /// Returns this many translations fewer than requested
    ShortBy(usize),
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// One scripted answer
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return exactly these texts
    Texts(Vec<String>),
    /// Translate normally but return only the first `n` texts
    Truncate(usize),
    /// Fail with this error
    Fail(ProviderError),
}

/// Document mode behavior
#[derive(Debug, Clone)]
pub enum DocumentBehavior {
    /// Translate every cue like batch mode does
    Translate,
    /// Fail with this error
    Fail(ProviderError),
}

/// Mock backend for testing translation behavior
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    /// Behavior mode
    behavior: MockBehavior,
    /// Replies consumed before `behavior` applies
    script: Arc<Mutex<VecDeque<ScriptedReply>>>,
    /// Request counter
    request_count: Arc<AtomicUsize>,
    /// Every batch request received
    requests: Arc<Mutex<Vec<BatchRequest>>>,
    /// Document capability, absent by default
    document: Option<DocumentBehavior>,
    /// Document calls received
    document_calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            script: Arc::new(Mutex::new(VecDeque::new())),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            document: None,
            document_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn short_by(missing: usize) -> Self {
        Self::new(MockBehavior::ShortBy(missing))
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Queue replies served before the behavior mode
    pub fn with_script(self, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        self.script.lock().extend(replies);
        self
    }

    /// Advertise document translation
    pub fn with_document(mut self, behavior: DocumentBehavior) -> Self {
        self.document = Some(behavior);
        self
    }

    /// The translation this mock produces for one text
    pub fn translate_text(text: &str, target_language: &str) -> String {
        format!("[{}] {}", target_language, text)
    }

    /// Batch calls received so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Document calls received so far
    pub fn document_call_count(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }

    /// Copies of every batch request received
    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().clone()
    }

    fn translate_all(request: &BatchRequest) -> Vec<String> {
        request
            .texts
            .iter()
            .map(|text| Self::translate_text(text, &request.target_language))
            .collect()
    }

    fn success(texts: Vec<String>) -> Result<BatchTranslation, ProviderError> {
        Ok(BatchTranslation {
            texts,
            usage: MOCK_USAGE_PER_CALL,
        })
    }
}

#[async_trait]
impl TranslationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    fn capabilities(&self) -> BackendCapabilities {
        if self.document.is_some() {
            BackendCapabilities::batch_and_document()
        } else {
            BackendCapabilities::batch_only()
        }
    }

    async fn translate_batch(&self, request: BatchRequest) -> Result<BatchTranslation, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let scripted = self.script.lock().pop_front();
        if let Some(reply) = scripted {
            return match reply {
                ScriptedReply::Texts(texts) => Self::success(texts),
                ScriptedReply::Truncate(n) => {
                    let mut texts = Self::translate_all(&request);
                    texts.truncate(n);
                    Self::success(texts)
                }
                ScriptedReply::Fail(error) => Err(error),
            };
        }

        match self.behavior {
            MockBehavior::Working => Self::success(Self::translate_all(&request)),

            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated API failure".to_string(),
            }),

            MockBehavior::ShortBy(missing) => {
                let mut texts = Self::translate_all(&request);
                let keep = texts.len().saturating_sub(missing);
                texts.truncate(keep);
                Self::success(texts)
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Self::success(Self::translate_all(&request))
            }
        }
    }

    async fn translate_document(
        &self,
        document: &str,
        target_language: &str,
    ) -> Result<DocumentTranslation, ProviderError> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);

        match &self.document {
            Some(DocumentBehavior::Translate) => {
                let cues = parse_srt(document)
                    .map_err(|e| ProviderError::ParseError(e.to_string()))?;
                let translated: Vec<_> = cues
                    .iter()
                    .map(|cue| cue.with_text(Self::translate_text(&cue.text, target_language)))
                    .collect();
                Ok(DocumentTranslation {
                    document: render_srt(&translated),
                    usage: MOCK_USAGE_PER_CALL,
                })
            }
            Some(DocumentBehavior::Fail(error)) => Err(error.clone()),
            None => Err(ProviderError::Unsupported(
                "Mock does not translate documents".to_string(),
            )),
        }
    }
}
