/*!
 * Job intake and deduplication.
 *
 * At most one job exists per canonical content key. The check-then-create
 * step is a single insert guarded by the UNIQUE key, so concurrent callers
 * for the same key, in this process or another, get exactly one creator.
 */

use log::{debug, error, info};
use std::sync::Arc;

use crate::app_config::ProviderConfig;
use crate::artifacts::{ArtifactLocator, ArtifactStore, Placeholder};
use crate::content::ContentKey;
use crate::database::models::{JobRecord, JobStatus};
use crate::database::Repository;
use crate::errors::PipelineError;

/// Result of admitting a content key
#[derive(Debug, Clone)]
pub struct AcquireOutcome {
    /// A job for the key existed before this call
    pub already_exists: bool,
    /// The job for the key, new or existing
    pub job: JobRecord,
    /// Where the job's artifact lives
    pub artifact: ArtifactLocator,
}

impl AcquireOutcome {
    pub fn job_id(&self) -> i64 {
        self.job.id
    }

    pub fn status(&self) -> JobStatus {
        self.job.status
    }
}

/// Idempotent admission of translation requests
#[derive(Debug, Clone)]
pub struct DedupGate {
    repo: Repository,
    artifacts: Arc<dyn ArtifactStore>,
}

impl DedupGate {
    pub fn new(repo: Repository, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { repo, artifacts }
    }

    /// Create the job for `key` unless one exists.
    ///
    /// The creator also writes the processing placeholder so an immediate
    /// read of the artifact returns a well-formed document.
    pub async fn acquire(
        &self,
        key: &ContentKey,
        provider: Option<&ProviderConfig>,
    ) -> Result<AcquireOutcome, PipelineError> {
        let new_job = key.to_new_job(
            provider.map(|p| p.provider_type.to_string()),
            provider.map(|p| p.effective_model()),
        );

        let (job, created) = self.repo.create_job_if_absent(&new_job).await?;
        let artifact = ArtifactLocator::new(job.artifact_path.clone());

        if created {
            info!("Created job {} for {}", job.id, key);
            if let Err(e) = self.artifacts.write_placeholder(&artifact, Placeholder::Processing) {
                error!("Failed to write processing placeholder for job {}: {:#}", job.id, e);
            }
        } else {
            debug!("Job {} already exists for {} ({})", job.id, key, job.status);
        }

        Ok(AcquireOutcome {
            already_exists: !created,
            job,
            artifact,
        })
    }
}
