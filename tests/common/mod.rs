/*!
 * Common test utilities for the subflow test suite
 */

use async_trait::async_trait;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use subflow::app_config::{Config, ProviderConfig, ProviderKind};
use subflow::app_controller::{AppController, Components};
use subflow::artifacts::FsArtifactStore;
use subflow::content::StreamIdResolver;
use subflow::database::{DatabaseConnection, Repository};
use subflow::errors::ProviderError;
use subflow::providers::mock::ScriptedBackend;
use subflow::providers::{BackendCapabilities, BackendRegistry, BatchRequest, BatchTranslation, TranslationBackend};
use subflow::sources::MemorySource;

/// Marker text that makes `PoisonBackend` fail a batch
pub const POISON: &str = "POISON";

/// SRT document with `count` cues, texts `Line 0 .. Line count-1`
pub fn srt_document(count: usize) -> String {
    let mut document = String::new();
    for i in 0..count {
        let start = i * 3;
        document.push_str(&format!(
            "{}\n00:{:02}:{:02},000 --> 00:{:02}:{:02},500\nLine {}\n\n",
            i + 1,
            start / 60,
            start % 60,
            (start + 2) / 60,
            (start + 2) % 60,
            i
        ));
    }
    document
}

/// Route pipeline logs to the test output; `RUST_LOG=debug` shows them
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test configuration with short backoffs and the given OpenAI batch size
pub fn test_config(batch_size: usize) -> Config {
    let mut config = Config::default();
    config.queue.orchestration_backoff_ms = 5;
    config.queue.batch_backoff_ms = 5;
    config.translation.common.retry_backoff_ms = 1;
    config.translation.provider = ProviderKind::OpenAI;

    for provider in &mut config.translation.available_providers {
        provider.batch_size = batch_size;
        provider.min_spacing_ms = Some(0);
    }
    config
}

/// Controller over an in-memory store, a memory source and registered backends
pub struct Harness {
    pub controller: AppController,
    pub repo: Repository,
    pub source: Arc<MemorySource>,
    pub artifacts: Arc<FsArtifactStore>,
    pub registry: Arc<BackendRegistry>,
    _dir: Option<TempDir>,
}

impl Harness {
    /// Harness whose OpenAI backend is `backend`
    pub fn new(backend: Arc<dyn TranslationBackend>, batch_size: usize) -> Self {
        Self::with_config(backend, test_config(batch_size))
    }

    pub fn with_config(backend: Arc<dyn TranslationBackend>, config: Config) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let repo = Repository::new_in_memory().expect("in-memory store");
        let artifacts = Arc::new(FsArtifactStore::new(dir.path()));
        Self::build(backend, config, repo, artifacts, Some(dir))
    }

    /// Harness over an existing store file and artifact root, as a restarted
    /// process finds them
    pub fn reopen(
        backend: Arc<dyn TranslationBackend>,
        batch_size: usize,
        db_path: &Path,
        artifact_root: &Path,
    ) -> Self {
        let repo = Repository::new(DatabaseConnection::new(db_path).expect("file store"));
        let artifacts = Arc::new(FsArtifactStore::new(artifact_root));
        Self::build(backend, test_config(batch_size), repo, artifacts, None)
    }

    fn build(
        backend: Arc<dyn TranslationBackend>,
        config: Config,
        repo: Repository,
        artifacts: Arc<FsArtifactStore>,
        dir: Option<TempDir>,
    ) -> Self {
        init_logging();
        let source = Arc::new(MemorySource::new());
        let registry = Arc::new(BackendRegistry::new(0.3));
        registry.register(ProviderKind::OpenAI, backend);

        let components = Components {
            repo: repo.clone(),
            artifacts: artifacts.clone(),
            source: source.clone(),
            backends: registry.clone(),
            resolver: Arc::new(StreamIdResolver::new()),
        };

        Self {
            controller: AppController::with_components(config, components),
            repo,
            source,
            artifacts,
            registry,
            _dir: dir,
        }
    }

    /// Harness with the mock backend
    pub fn scripted(backend: ScriptedBackend, batch_size: usize) -> Self {
        Self::new(Arc::new(backend), batch_size)
    }

    /// Artifact document of a job
    pub async fn artifact(&self, job_id: i64) -> String {
        let job = self.repo.get_job(job_id).await.unwrap().unwrap();
        self.controller
            .read_artifact(&job)
            .unwrap()
            .unwrap_or_default()
    }

    pub fn artifact_root(&self) -> &Path {
        self.artifacts.root()
    }
}

/// Translates like the mock but fails every batch containing `POISON`
/// after a short delay
#[derive(Debug, Default)]
pub struct PoisonBackend;

#[async_trait]
impl TranslationBackend for PoisonBackend {
    fn name(&self) -> &str {
        "Poison"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::batch_only()
    }

    async fn translate_batch(&self, request: BatchRequest) -> Result<BatchTranslation, ProviderError> {
        if request.texts.iter().any(|t| t.contains(POISON)) {
            tokio::time::sleep(Duration::from_millis(30)).await;
            return Err(ProviderError::ApiError {
                status_code: 502,
                message: "bad gateway".to_string(),
            });
        }

        Ok(BatchTranslation {
            texts: request
                .texts
                .iter()
                .map(|t| ScriptedBackend::translate_text(t, &request.target_language))
                .collect(),
            usage: 1,
        })
    }
}

/// Working backend with a random delay per call, so batches finish out of order
#[derive(Debug, Default)]
pub struct JitterBackend;

#[async_trait]
impl TranslationBackend for JitterBackend {
    fn name(&self) -> &str {
        "Jitter"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::batch_only()
    }

    async fn translate_batch(&self, request: BatchRequest) -> Result<BatchTranslation, ProviderError> {
        let delay = rand::rng().random_range(0..25);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        Ok(BatchTranslation {
            texts: request
                .texts
                .iter()
                .map(|t| ScriptedBackend::translate_text(t, &request.target_language))
                .collect(),
            usage: request.texts.len() as u64,
        })
    }
}

/// OpenAI provider config as the tests resolve it
pub fn openai_provider(batch_size: usize) -> ProviderConfig {
    let mut provider = ProviderConfig::new(ProviderKind::OpenAI);
    provider.batch_size = batch_size;
    provider
}
