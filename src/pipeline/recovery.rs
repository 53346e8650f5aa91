/*!
 * Batch translation with count-mismatch recovery.
 *
 * An explicit loop carrying the attempt number and the latest partial
 * answer:
 * - a provider error waits `backoff * attempt` and tries again
 * - a count mismatch goes straight to a recovery request that hands the
 *   misaligned answer back to the backend
 * - the budget is shared by both paths; usage of every attempt is summed
 */

use log::{debug, warn};
use std::time::Duration;

use crate::app_config::{ProviderConfig, TranslationCommonConfig};
use crate::errors::{PipelineError, ProviderError};
use crate::pipeline::rate_limit::RateLimiter;
use crate::providers::{BatchRequest, BatchTranslation, TranslationBackend};

/// Attempt budget and timing for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number after a provider error
    pub backoff: Duration,
    /// Bound on a single provider call
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(common: &TranslationCommonConfig, provider: &ProviderConfig) -> Self {
        Self {
            max_attempts: common.max_attempts.max(1),
            backoff: Duration::from_millis(common.retry_backoff_ms),
            timeout: Duration::from_secs(provider.timeout_secs),
        }
    }

    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// A batch translated with exactly the requested number of texts
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredBatch {
    pub texts: Vec<String>,
    /// Summed over all attempts
    pub usage: u64,
    pub attempts: u32,
}

/// What the previous attempt left behind
enum Carry {
    Fresh,
    Mismatch(Vec<String>),
}

/// Translate `texts`, admitting each call through `limiter`
pub async fn translate_with_recovery(
    backend: &dyn TranslationBackend,
    limiter: &RateLimiter,
    texts: &[String],
    target_language: &str,
    policy: &RetryPolicy,
) -> Result<RecoveredBatch, PipelineError> {
    let expected = texts.len();
    let mut usage = 0u64;
    let mut partial: Option<Vec<String>> = None;
    let mut last_error = PipelineError::Provider(ProviderError::EmptyResponse);

    for attempt in 1..=policy.max_attempts {
        let mut request = BatchRequest::new(texts.to_vec(), target_language);
        if let Some(previous) = &partial {
            request = request.recovery(previous.clone());
        }

        let carry = match call(backend, limiter, request, policy.timeout).await {
            Ok(translation) => {
                usage += translation.usage;
                if translation.texts.len() == expected {
                    debug!(
                        "{} translated {} texts on attempt {}",
                        backend.name(),
                        expected,
                        attempt
                    );
                    return Ok(RecoveredBatch {
                        texts: translation.texts,
                        usage,
                        attempts: attempt,
                    });
                }

                warn!(
                    "{} returned {} of {} texts on attempt {}/{}",
                    backend.name(),
                    translation.texts.len(),
                    expected,
                    attempt,
                    policy.max_attempts
                );
                last_error = PipelineError::CountMismatch {
                    expected,
                    received: translation.texts.len(),
                };
                Carry::Mismatch(translation.texts)
            }
            Err(error) => {
                usage += error.billed_usage();
                warn!(
                    "{} attempt {}/{} failed: {}",
                    backend.name(),
                    attempt,
                    policy.max_attempts,
                    error
                );
                last_error = PipelineError::Provider(error);
                Carry::Fresh
            }
        };

        if attempt == policy.max_attempts {
            break;
        }

        match carry {
            Carry::Mismatch(texts) => partial = Some(texts),
            Carry::Fresh => tokio::time::sleep(policy.backoff_after(attempt)).await,
        }
    }

    Err(last_error)
}

async fn call(
    backend: &dyn TranslationBackend,
    limiter: &RateLimiter,
    request: BatchRequest,
    timeout: Duration,
) -> Result<BatchTranslation, ProviderError> {
    let _permit = limiter.acquire().await?;

    tokio::time::timeout(timeout, backend.translate_batch(request))
        .await
        .map_err(|_| ProviderError::Timeout {
            seconds: timeout.as_secs(),
        })?
}
