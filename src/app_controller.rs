use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{Config, ProviderConfig, ProviderKind};
use crate::artifacts::{ArtifactLocator, ArtifactStore, FsArtifactStore};
use crate::content::{ContentKey, ContentResolver, RequesterScope, StreamIdResolver};
use crate::database::models::{BatchProgress, JobRecord, JobStatus};
use crate::database::{DatabaseConnection, DatabaseStats, Repository};
use crate::errors::PipelineError;
use crate::pipeline::{
    AssemblyEngine, BatchTask, BatchWorker, DedupGate, LimiterRegistry, OrchestrationTask,
    Orchestrator, StatusMachine,
};
use crate::providers::BackendRegistry;
use crate::queue::{QueueOptions, WorkQueue};
use crate::sources::{OpenSubtitlesSource, SubtitleSource};

// @module: Service facade wiring the job pipeline together

/// Interval between two store reads while waiting for a job
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Most interrupted jobs picked up by one resume pass
const RESUME_SCAN_LIMIT: usize = 10_000;

/// Collaborators the pipeline runs against
pub struct Components {
    pub repo: Repository,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub source: Arc<dyn SubtitleSource>,
    pub backends: Arc<BackendRegistry>,
    pub resolver: Arc<dyn ContentResolver>,
}

impl Components {
    // @creates: Production collaborators from the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = DatabaseConnection::open(config.database_path.as_deref())
            .context("Failed to open job store")?;

        Ok(Self {
            repo: Repository::new(db),
            artifacts: Arc::new(FsArtifactStore::new(&config.artifact_root)),
            source: Arc::new(OpenSubtitlesSource::new(&config.source)),
            backends: Arc::new(BackendRegistry::new(config.translation.common.temperature)),
            resolver: Arc::new(StreamIdResolver::new()),
        })
    }

    /// Replace the subtitle source
    pub fn with_source(mut self, source: Arc<dyn SubtitleSource>) -> Self {
        self.source = source;
        self
    }
}

/// Answer to a subtitle request
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub job_id: i64,
    /// This request created the job
    pub created: bool,
    /// Status right after the request
    pub status: JobStatus,
    /// Where the subtitle (or its placeholder) can be read
    pub artifact: ArtifactLocator,
}

/// Main application controller for subtitle translation jobs
pub struct AppController {
    // @field: App configuration
    config: Config,
    repo: Repository,
    artifacts: Arc<dyn ArtifactStore>,
    resolver: Arc<dyn ContentResolver>,
    gate: DedupGate,
    status: StatusMachine,
    orchestration_queue: WorkQueue<OrchestrationTask>,
    batch_queue: WorkQueue<BatchTask>,
}

impl AppController {
    /// Controller with production collaborators; needs a running tokio runtime
    pub fn new(config: Config) -> Result<Self> {
        let components = Components::from_config(&config)?;
        Ok(Self::with_components(config, components))
    }

    /// Controller over the given collaborators; needs a running tokio runtime
    pub fn with_components(config: Config, components: Components) -> Self {
        let Components {
            repo,
            artifacts,
            source,
            backends,
            resolver,
        } = components;

        let limiters = Arc::new(LimiterRegistry::new());
        let status = StatusMachine::new(repo.clone(), Arc::clone(&artifacts));
        let assembly = AssemblyEngine::new(repo.clone(), Arc::clone(&artifacts));

        let worker = BatchWorker::new(
            repo.clone(),
            Arc::clone(&backends),
            Arc::clone(&limiters),
            assembly.clone(),
            status.clone(),
            config.translation.common.clone(),
        );
        let batch_queue = WorkQueue::start(QueueOptions::batch(&config.queue), Arc::new(worker));

        let orchestrator = Orchestrator::new(
            repo.clone(),
            source,
            backends,
            limiters,
            status.clone(),
            assembly,
            batch_queue.clone(),
        );
        let orchestration_queue = WorkQueue::start(
            QueueOptions::orchestration(&config.queue),
            Arc::new(orchestrator),
        );

        Self {
            gate: DedupGate::new(repo.clone(), Arc::clone(&artifacts)),
            config,
            repo,
            artifacts,
            resolver,
            status,
            orchestration_queue,
            batch_queue,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Admit a subtitle request for a stream id.
    ///
    /// An existing job for the same content key is returned as is. A new job
    /// is either queued for translation or, when the stream id cannot be
    /// identified with enough confidence, parked in manual search.
    pub async fn request_subtitle(
        &self,
        stream_id: &str,
        language: &str,
        scope: RequesterScope,
        provider: Option<ProviderKind>,
    ) -> Result<RequestOutcome, PipelineError> {
        let resolution = self.resolver.resolve(stream_id).await?;
        let key = ContentKey::new(
            resolution.media_id.clone(),
            resolution.season,
            resolution.episode,
            language,
            scope,
        );
        let provider = self.config.translation.resolve_provider(provider);

        let acquired = self.gate.acquire(&key, Some(&provider)).await?;
        let job_id = acquired.job_id();

        if acquired.already_exists {
            return Ok(RequestOutcome {
                job_id,
                created: false,
                status: acquired.status(),
                artifact: acquired.artifact,
            });
        }

        let status = match resolution.check(stream_id, self.config.resolver.min_confidence) {
            Err(ambiguous) => {
                self.status
                    .route_to_manual_search(job_id, &ambiguous.to_string())
                    .await?;
                JobStatus::ManualSearch
            }
            Ok(()) => {
                self.enqueue(job_id, &key.language, provider)?;
                JobStatus::Processing
            }
        };

        Ok(RequestOutcome {
            job_id,
            created: true,
            status,
            artifact: acquired.artifact,
        })
    }

    /// Send a failed or manual-search job through the pipeline again
    pub async fn reprocess(
        &self,
        job_id: i64,
        provider: Option<ProviderKind>,
    ) -> Result<JobRecord, PipelineError> {
        let job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))?;

        let kind = provider.or_else(|| job.provider.as_deref().and_then(|p| p.parse().ok()));
        let provider = self.config.translation.resolve_provider(kind);

        let job = self.status.begin_reprocess(job_id, Some(&provider)).await?;
        self.enqueue(job_id, &job.language, provider)?;
        Ok(job)
    }

    /// Queue every job a previous process left in `processing`.
    ///
    /// Call once after construction, before admitting requests. Orchestration
    /// replaces whatever batches the interrupted run had stored.
    pub async fn resume_interrupted(&self) -> Result<usize, PipelineError> {
        let jobs = self
            .repo
            .list_jobs(Some(JobStatus::Processing), RESUME_SCAN_LIMIT)
            .await?;

        for job in &jobs {
            let kind = job.provider.as_deref().and_then(|p| p.parse().ok());
            let provider = self.config.translation.resolve_provider(kind);
            self.enqueue(job.id, &job.language, provider)?;
        }

        if !jobs.is_empty() {
            info!("Resumed {} interrupted jobs", jobs.len());
        }
        Ok(jobs.len())
    }

    /// Job record with its batch counts
    pub async fn job_status(&self, job_id: i64) -> Result<(JobRecord, BatchProgress), PipelineError> {
        let job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))?;
        let progress = self.repo.batch_progress(job_id).await?;
        Ok((job, progress))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<JobRecord>, PipelineError> {
        Ok(self.repo.list_jobs(status, limit).await?)
    }

    /// Row counts of the job store
    pub async fn store_stats(&self) -> Result<DatabaseStats, PipelineError> {
        Ok(self.repo.connection().stats().await?)
    }

    /// Remove a job and its batches; the artifact is left in place
    pub async fn delete_job(&self, job_id: i64) -> Result<bool, PipelineError> {
        let deleted = self.repo.delete_job(job_id).await?;
        if deleted {
            info!("Deleted job {}", job_id);
        }
        Ok(deleted)
    }

    /// Current artifact document of a job
    pub fn read_artifact(&self, job: &JobRecord) -> Result<Option<String>, PipelineError> {
        Ok(self
            .artifacts
            .read(&ArtifactLocator::new(job.artifact_path.clone()))?)
    }

    /// Poll until the job leaves `processing` or `timeout` passes.
    ///
    /// `on_progress` sees every poll; the last read job is returned either way.
    pub async fn wait_for_job<F>(
        &self,
        job_id: i64,
        timeout: Duration,
        mut on_progress: F,
    ) -> Result<JobRecord, PipelineError>
    where
        F: FnMut(&JobRecord, &BatchProgress),
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (job, progress) = self.job_status(job_id).await?;
            on_progress(&job, &progress);

            if job.status != JobStatus::Processing {
                return Ok(job);
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("Job {} still processing after {:?}", job_id, timeout);
                return Ok(job);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Wait until both queues have no queued, running or retrying task
    pub async fn shutdown_idle(&self) {
        self.orchestration_queue.wait_idle().await;
        self.batch_queue.wait_idle().await;
        debug!(
            "Queues idle: orchestration {:?}, batch {:?}",
            self.orchestration_queue.stats(),
            self.batch_queue.stats()
        );
    }

    fn enqueue(&self, job_id: i64, language: &str, provider: ProviderConfig) -> Result<(), PipelineError> {
        info!(
            "Queueing job {} for {} with {}",
            job_id,
            language,
            provider.provider_type.display_name()
        );
        self.orchestration_queue.push(OrchestrationTask {
            job_id,
            target_language: language.to_string(),
            provider,
            source: None,
        })?;
        Ok(())
    }
}
