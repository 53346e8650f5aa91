/*!
 * Translation orchestrator.
 *
 * Top-level driver of one job:
 * - fetch the source subtitle, failing the job when none exists
 * - hand the source through untouched when it is already in the target language
 * - parse it into cues carrying their global index
 * - try whole-document translation when the backend offers it, falling back
 *   to batches on any runtime error
 * - otherwise replace the job's batch set and enqueue one task per batch
 *
 * Every step is safe to redeliver: a job that left `processing` is skipped
 * and the batch set is replaced, never appended to.
 */

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::artifacts::Placeholder;
use crate::content::ContentKey;
use crate::database::models::JobStatus;
use crate::database::Repository;
use crate::errors::{PipelineError, ProviderError};
use crate::language_utils::languages_match;
use crate::pipeline::assembly::AssemblyEngine;
use crate::pipeline::batching::partition;
use crate::pipeline::rate_limit::LimiterRegistry;
use crate::pipeline::status::StatusMachine;
use crate::pipeline::tasks::{BatchTask, OrchestrationTask};
use crate::providers::{BackendRegistry, DocumentTranslation, TranslationBackend, TranslationMode};
use crate::queue::{TaskHandler, WorkQueue};
use crate::sources::{SourceSubtitle, SubtitleSource};
use crate::subtitle_processor::parse_srt;

/// What one orchestration delivery did
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Job missing or no longer processing
    Skipped,
    /// No source subtitle exists; job failed
    SourceUnavailable,
    /// Source already in the target language; job completed
    PassedThrough,
    /// Whole-document translation succeeded; job completed
    DocumentTranslated,
    /// Batches persisted and enqueued
    Batched { batches: usize },
    /// Job failed before any batch was created
    Failed,
}

/// Drives jobs from source fetch to enqueued batches
pub struct Orchestrator {
    repo: Repository,
    source: Arc<dyn SubtitleSource>,
    backends: Arc<BackendRegistry>,
    limiters: Arc<LimiterRegistry>,
    status: StatusMachine,
    assembly: AssemblyEngine,
    batch_queue: WorkQueue<BatchTask>,
}

impl Orchestrator {
    pub fn new(
        repo: Repository,
        source: Arc<dyn SubtitleSource>,
        backends: Arc<BackendRegistry>,
        limiters: Arc<LimiterRegistry>,
        status: StatusMachine,
        assembly: AssemblyEngine,
        batch_queue: WorkQueue<BatchTask>,
    ) -> Self {
        Self {
            repo,
            source,
            backends,
            limiters,
            status,
            assembly,
            batch_queue,
        }
    }

    /// Run one job up to the point where batch workers take over
    pub async fn start(&self, task: &OrchestrationTask) -> Result<StartOutcome, PipelineError> {
        let job_id = task.job_id;
        let job = match self.repo.get_job(job_id).await? {
            Some(job) if job.status == JobStatus::Processing => job,
            Some(job) => {
                debug!("Job {} is {}; orchestration skipped", job_id, job.status);
                return Ok(StartOutcome::Skipped);
            }
            None => {
                debug!("Job {} no longer exists; orchestration skipped", job_id);
                return Ok(StartOutcome::Skipped);
            }
        };

        let key = ContentKey::from_job(&job);
        let Some(source) = self.select_source(task, &key).await? else {
            let reason = PipelineError::SourceUnavailable(format!("no source subtitle for {}", key));
            self.status
                .fail_job(job_id, &reason.to_string(), None, Placeholder::NotFound)
                .await?;
            return Ok(StartOutcome::SourceUnavailable);
        };

        info!("Job {}: downloading {} source {}", job_id, source.language, source.url);
        let document = self.source.download(&source).await?;

        if languages_match(&source.language, &task.target_language) {
            info!("Job {}: source already in {}, no translation needed", job_id, task.target_language);
            return Ok(if self.assembly.finalize_document(job_id, document, 0).await? {
                StartOutcome::PassedThrough
            } else {
                StartOutcome::Skipped
            });
        }

        let cues = match parse_srt(&document) {
            Ok(cues) => cues,
            Err(e) => return self.fail(job_id, &e).await,
        };

        let backend = match self.backends.backend_for(&task.provider) {
            Ok(backend) => backend,
            Err(e) => return self.fail(job_id, &PipelineError::Provider(e)).await,
        };

        if backend.capabilities().supports(TranslationMode::Document) {
            match self.translate_document(backend.as_ref(), task, &document, cues.len()).await {
                Ok(translation) => {
                    return Ok(
                        if self
                            .assembly
                            .finalize_document(job_id, translation.document, translation.usage)
                            .await?
                        {
                            StartOutcome::DocumentTranslated
                        } else {
                            StartOutcome::Skipped
                        },
                    );
                }
                Err(e) => warn!(
                    "Job {}: document translation with {} failed ({}); falling back to batches",
                    job_id,
                    backend.name(),
                    e
                ),
            }
        }

        let batch_size = task.provider.effective_batch_size();
        let batches = partition(&cues, batch_size);
        let Some(records) = self.repo.replace_batches(job_id, batches).await? else {
            debug!("Job {} left processing before its batches were stored", job_id);
            return Ok(StartOutcome::Skipped);
        };

        info!(
            "Job {}: {} cues split into {} batches of up to {}",
            job_id,
            cues.len(),
            records.len(),
            batch_size
        );

        for record in &records {
            self.batch_queue.push(BatchTask {
                batch_id: record.id,
                job_id,
                batch_number: record.batch_number,
                target_language: task.target_language.clone(),
                provider: task.provider.clone(),
            })?;
        }

        Ok(StartOutcome::Batched {
            batches: records.len(),
        })
    }

    async fn select_source(
        &self,
        task: &OrchestrationTask,
        key: &ContentKey,
    ) -> Result<Option<SourceSubtitle>, PipelineError> {
        if let Some(source) = &task.source {
            return Ok(Some(source.clone()));
        }
        Ok(self.source.search(key).await?.into_iter().next())
    }

    /// One whole-document call behind the limiter; the result must parse
    /// back into the same number of cues
    async fn translate_document(
        &self,
        backend: &dyn TranslationBackend,
        task: &OrchestrationTask,
        document: &str,
        cue_count: usize,
    ) -> Result<DocumentTranslation, ProviderError> {
        let limiter = self.limiters.limiter_for(&task.provider);
        let _permit = limiter.acquire().await?;

        let timeout = std::time::Duration::from_secs(task.provider.timeout_secs);
        let translation = tokio::time::timeout(
            timeout,
            backend.translate_document(document, &task.target_language),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            seconds: timeout.as_secs(),
        })??;

        let translated = parse_srt(&translation.document)
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        if translated.len() != cue_count {
            return Err(ProviderError::ParseError(format!(
                "document came back with {} cues instead of {}",
                translated.len(),
                cue_count
            )));
        }

        Ok(translation)
    }

    async fn fail(&self, job_id: i64, cause: &PipelineError) -> Result<StartOutcome, PipelineError> {
        self.status
            .fail_job(job_id, &cause.to_string(), None, Placeholder::Failure)
            .await?;
        Ok(StartOutcome::Failed)
    }
}

#[async_trait]
impl TaskHandler<OrchestrationTask> for Orchestrator {
    async fn handle(&self, task: &OrchestrationTask, attempt: u32) -> Result<(), PipelineError> {
        if attempt > 1 {
            debug!("Redelivery {} of job {}", attempt, task.job_id);
        }
        self.start(task).await.map(|_| ())
    }

    async fn on_exhausted(&self, task: &OrchestrationTask, error: PipelineError) {
        if let Err(e) = self
            .status
            .fail_job(task.job_id, &error.to_string(), None, Placeholder::Failure)
            .await
        {
            error!("Could not fail job {}: {}", task.job_id, e);
        }
    }
}
