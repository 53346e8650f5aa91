/*!
 * Final artifact assembly.
 *
 * Runs once every batch of a job is completed. Translated entries from all
 * batches are ordered by global index, checked for gaps, rendered and
 * written together with the `processing -> completed` transition. Only one
 * caller can win that transition, so concurrent or repeated calls are safe.
 */

use log::{debug, info, warn};
use std::sync::Arc;

use crate::artifacts::{ArtifactLocator, ArtifactStore};
use crate::database::models::{BatchStatus, JobStatus};
use crate::database::Repository;
use crate::errors::PipelineError;
use crate::subtitle_processor::{render_srt, Cue};

/// What an assembly call did
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    /// This call wrote the artifact and completed the job
    Completed { cue_count: usize, usage: u64 },
    /// The job had already left `processing`
    AlreadyFinalized,
    /// Some batch is not completed yet
    NotReady,
}

/// Merges completed batches into the job artifact
#[derive(Debug, Clone)]
pub struct AssemblyEngine {
    repo: Repository,
    artifacts: Arc<dyn ArtifactStore>,
}

impl AssemblyEngine {
    pub fn new(repo: Repository, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { repo, artifacts }
    }

    /// Assemble and finalize a job from its completed batches
    pub async fn assemble(&self, job_id: i64) -> Result<AssemblyOutcome, PipelineError> {
        let job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))?;

        if job.status != JobStatus::Processing {
            debug!("Job {} is {}; nothing to assemble", job_id, job.status);
            return Ok(AssemblyOutcome::AlreadyFinalized);
        }

        let batches = self.repo.batches_for_job(job_id).await?;
        if batches.is_empty() || batches.iter().any(|b| b.status != BatchStatus::Completed) {
            return Ok(AssemblyOutcome::NotReady);
        }

        let usage: u64 = batches.iter().map(|b| b.usage).sum();
        let mut cues: Vec<Cue> = Vec::with_capacity(batches.iter().map(|b| b.source_entries.len()).sum());
        for batch in batches {
            let translated = batch.translated_entries.ok_or_else(|| {
                PipelineError::Persistence(format!(
                    "batch {} of job {} is completed without entries",
                    batch.batch_number, job_id
                ))
            })?;
            cues.extend(translated);
        }

        cues.sort_by_key(|c| c.global_index);
        if let Some(position) = cues.iter().enumerate().position(|(i, c)| c.global_index != i) {
            return Err(PipelineError::Persistence(format!(
                "job {} has a gap in translated entries at index {}",
                job_id, position
            )));
        }

        let cue_count = cues.len();
        let document = render_srt(&cues);
        let locator = ArtifactLocator::new(job.artifact_path);

        if self.finalize(job_id, usage, locator, document).await? {
            info!("Job {} completed: {} cues, usage {}", job_id, cue_count, usage);
            Ok(AssemblyOutcome::Completed { cue_count, usage })
        } else {
            debug!("Job {} was finalized by another caller", job_id);
            Ok(AssemblyOutcome::AlreadyFinalized)
        }
    }

    /// Complete a job with a document produced without batches
    pub async fn finalize_document(
        &self,
        job_id: i64,
        document: String,
        usage: u64,
    ) -> Result<bool, PipelineError> {
        let job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))?;

        let locator = ArtifactLocator::new(job.artifact_path);
        let finalized = self.finalize(job_id, usage, locator, document).await?;
        if finalized {
            info!("Job {} completed from a whole document", job_id);
        } else {
            warn!("Job {} was not processing; document discarded", job_id);
        }
        Ok(finalized)
    }

    async fn finalize(
        &self,
        job_id: i64,
        usage: u64,
        locator: ArtifactLocator,
        document: String,
    ) -> Result<bool, PipelineError> {
        let artifacts = Arc::clone(&self.artifacts);
        let finalized = self
            .repo
            .finalize_job(job_id, usage, move || artifacts.write(&locator, &document))
            .await?;
        Ok(finalized)
    }
}
