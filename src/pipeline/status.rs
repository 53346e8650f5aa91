/*!
 * Job status transitions.
 *
 * `processing` is the only state workers move a job out of:
 * - `processing -> completed` happens in the assembly engine
 * - `processing -> failed` happens here, together with the batch cascade
 * - `processing -> manual_search` happens here when identity is unclear
 *
 * `failed` and `manual_search` only return to `processing` through an
 * explicit reprocess request.
 */

use log::{error, info, warn};
use std::sync::Arc;

use crate::app_config::ProviderConfig;
use crate::artifacts::{ArtifactLocator, ArtifactStore, Placeholder};
use crate::database::models::{CascadeOutcome, JobRecord};
use crate::database::Repository;
use crate::errors::PipelineError;

/// Owner of job status changes outside assembly
#[derive(Debug, Clone)]
pub struct StatusMachine {
    repo: Repository,
    artifacts: Arc<dyn ArtifactStore>,
}

impl StatusMachine {
    pub fn new(repo: Repository, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { repo, artifacts }
    }

    /// Fail a job and every sibling batch in one step.
    ///
    /// Only the call that performs the transition writes the placeholder;
    /// later calls for the same job return `transitioned: false`.
    pub async fn fail_job(
        &self,
        job_id: i64,
        reason: &str,
        failed_batch_id: Option<i64>,
        placeholder: Placeholder,
    ) -> Result<CascadeOutcome, PipelineError> {
        let outcome = self
            .repo
            .fail_job_cascade(job_id, reason, failed_batch_id)
            .await?;

        if !outcome.transitioned {
            info!("Job {} already left processing; cascade skipped", job_id);
            return Ok(outcome);
        }

        error!(
            "Job {} failed ({} batches cancelled): {}",
            job_id, outcome.batches_failed, reason
        );

        if let Some(job) = self.repo.get_job(job_id).await? {
            self.write_placeholder(&job, placeholder);
        }

        Ok(outcome)
    }

    /// `processing -> manual_search`; not an error
    pub async fn route_to_manual_search(&self, job_id: i64, reason: &str) -> Result<bool, PipelineError> {
        let moved = self.repo.mark_manual_search(job_id, reason).await?;
        if moved {
            info!("Job {} routed to manual search: {}", job_id, reason);
        } else {
            warn!("Job {} was not processing; manual search not applied", job_id);
        }
        Ok(moved)
    }

    /// `failed | manual_search -> processing`, clearing the job's batches
    pub async fn begin_reprocess(
        &self,
        job_id: i64,
        provider: Option<&ProviderConfig>,
    ) -> Result<JobRecord, PipelineError> {
        let job = self
            .repo
            .begin_reprocess(
                job_id,
                provider.map(|p| p.provider_type.to_string()),
                provider.map(|p| p.effective_model()),
            )
            .await?;

        info!("Job {} reprocessing (retry {})", job_id, job.retry_attempts);
        self.write_placeholder(&job, Placeholder::Processing);
        Ok(job)
    }

    fn write_placeholder(&self, job: &JobRecord, placeholder: Placeholder) {
        let locator = ArtifactLocator::new(job.artifact_path.clone());
        if let Err(e) = self.artifacts.write_placeholder(&locator, placeholder) {
            error!("Failed to write placeholder for job {}: {:#}", job.id, e);
        }
    }
}
