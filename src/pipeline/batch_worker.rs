/*!
 * Batch worker.
 *
 * Processes one persisted batch per delivery:
 * 1. Claim the batch; a missing, failed or cancelled batch is a no-op
 * 2. Translate its texts through the rate limiter with mismatch recovery
 * 3. Store the translated cues, refused if the job left `processing`
 * 4. Count incomplete siblings from the store and assemble at zero
 *
 * A translation that exhausts its attempts fails the whole job through the
 * cascade. Store errors are returned to the queue for redelivery.
 */

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::app_config::TranslationCommonConfig;
use crate::artifacts::Placeholder;
use crate::database::models::{BatchClaim, BatchRecord};
use crate::database::Repository;
use crate::errors::PipelineError;
use crate::pipeline::assembly::{AssemblyEngine, AssemblyOutcome};
use crate::pipeline::rate_limit::LimiterRegistry;
use crate::pipeline::recovery::{translate_with_recovery, RetryPolicy};
use crate::pipeline::status::StatusMachine;
use crate::pipeline::tasks::BatchTask;
use crate::providers::BackendRegistry;
use crate::queue::TaskHandler;
use crate::subtitle_processor::Cue;

/// What one delivery of a batch task did
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Batch gone, failed or its job no longer processing
    Skipped,
    /// Batch stored; `remaining` siblings are still incomplete
    Completed { remaining: i64 },
    /// Batch stored and it was the last one
    Assembled(AssemblyOutcome),
    /// Translation failed terminally and the job was failed
    Failed,
}

/// Translates single batches and detects job completion
#[derive(Debug, Clone)]
pub struct BatchWorker {
    repo: Repository,
    backends: Arc<BackendRegistry>,
    limiters: Arc<LimiterRegistry>,
    assembly: AssemblyEngine,
    status: StatusMachine,
    common: TranslationCommonConfig,
}

impl BatchWorker {
    pub fn new(
        repo: Repository,
        backends: Arc<BackendRegistry>,
        limiters: Arc<LimiterRegistry>,
        assembly: AssemblyEngine,
        status: StatusMachine,
        common: TranslationCommonConfig,
    ) -> Self {
        Self {
            repo,
            backends,
            limiters,
            assembly,
            status,
            common,
        }
    }

    /// Process one batch task; safe to run more than once for the same task
    pub async fn process(&self, task: &BatchTask) -> Result<BatchOutcome, PipelineError> {
        let batch = match self.repo.claim_batch(task.batch_id).await? {
            BatchClaim::Claimed(batch) => batch,
            BatchClaim::AlreadyCompleted { job_id } => {
                debug!("Batch {} already completed; checking job {}", task.batch_id, job_id);
                return self.after_completion(job_id).await;
            }
            BatchClaim::Cancelled { job_id } => {
                info!("Batch {} of job {} was cancelled; skipping", task.batch_id, job_id);
                return Ok(BatchOutcome::Skipped);
            }
            BatchClaim::Missing => {
                debug!("Batch {} no longer exists; skipping", task.batch_id);
                return Ok(BatchOutcome::Skipped);
            }
        };

        debug!(
            "Processing batch {} of job {} ({} cues, attempt {})",
            batch.batch_number,
            batch.job_id,
            batch.source_entries.len(),
            batch.attempts
        );

        let backend = match self.backends.backend_for(&task.provider) {
            Ok(backend) => backend,
            Err(e) => {
                self.fail(&batch, &PipelineError::Provider(e)).await?;
                return Ok(BatchOutcome::Failed);
            }
        };
        let limiter = self.limiters.limiter_for(&task.provider);
        let policy = RetryPolicy::new(&self.common, &task.provider);

        let translated = match translate_with_recovery(
            backend.as_ref(),
            &limiter,
            &batch.source_texts(),
            &task.target_language,
            &policy,
        )
        .await
        {
            Ok(translated) => translated,
            Err(e) => {
                self.fail(&batch, &e).await?;
                return Ok(BatchOutcome::Failed);
            }
        };

        if translated.attempts > 1 {
            info!(
                "Batch {} of job {} recovered after {} attempts",
                batch.batch_number, batch.job_id, translated.attempts
            );
        }

        let cues: Vec<Cue> = batch
            .source_entries
            .iter()
            .zip(translated.texts)
            .map(|(source, text)| source.with_text(text))
            .collect();

        if !self.repo.complete_batch(batch.id, &cues, translated.usage).await? {
            warn!(
                "Batch {} of job {} finished after its job left processing; result dropped",
                batch.batch_number, batch.job_id
            );
            return Ok(BatchOutcome::Skipped);
        }

        info!(
            "Batch {} of job {} completed ({} cues, usage {})",
            batch.batch_number,
            batch.job_id,
            cues.len(),
            translated.usage
        );

        self.after_completion(batch.job_id).await
    }

    async fn after_completion(&self, job_id: i64) -> Result<BatchOutcome, PipelineError> {
        let remaining = self.repo.count_incomplete_batches(job_id).await?;
        if remaining > 0 {
            debug!("Job {} has {} batches left", job_id, remaining);
            return Ok(BatchOutcome::Completed { remaining });
        }

        let outcome = self.assembly.assemble(job_id).await?;
        Ok(BatchOutcome::Assembled(outcome))
    }

    async fn fail(&self, batch: &BatchRecord, cause: &PipelineError) -> Result<(), PipelineError> {
        let reason = format!("batch {} failed: {}", batch.batch_number, cause);
        self.status
            .fail_job(batch.job_id, &reason, Some(batch.id), Placeholder::Failure)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskHandler<BatchTask> for BatchWorker {
    async fn handle(&self, task: &BatchTask, attempt: u32) -> Result<(), PipelineError> {
        if attempt > 1 {
            debug!("Redelivery {} of batch {}", attempt, task.batch_id);
        }
        self.process(task).await.map(|_| ())
    }

    async fn on_exhausted(&self, task: &BatchTask, error: PipelineError) {
        let reason = format!("batch {} failed: {}", task.batch_number, error);
        if let Err(e) = self
            .status
            .fail_job(task.job_id, &reason, Some(task.batch_id), Placeholder::Failure)
            .await
        {
            error!("Could not fail job {} after batch {}: {}", task.job_id, task.batch_id, e);
        }
    }
}
