/*!
 * Tests for idempotent job admission under concurrency
 */

use futures::future::join_all;
use std::sync::Arc;
use tempfile::TempDir;

use subflow::artifacts::{ArtifactStore, FsArtifactStore, PROCESSING_MESSAGE};
use subflow::content::{ContentKey, RequesterScope};
use subflow::database::{DatabaseConnection, Repository};
use subflow::database::models::JobStatus;
use subflow::pipeline::DedupGate;
use subflow::providers::mock::ScriptedBackend;

use crate::common::{self, Harness};

/// Many simultaneous acquires for one key create exactly one job
#[tokio::test]
async fn test_acquire_withConcurrentRequests_shouldCreateOneJob() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::new_in_memory().unwrap();
    let artifacts = Arc::new(FsArtifactStore::new(dir.path()));
    let gate = DedupGate::new(repo.clone(), artifacts.clone());
    let key = ContentKey::episode("tt0944947", 1, 1, "fr", RequesterScope::Anonymous);
    let provider = common::openai_provider(60);

    let outcomes = join_all((0..16).map(|_| {
        let gate = gate.clone();
        let key = key.clone();
        let provider = provider.clone();
        tokio::spawn(async move { gate.acquire(&key, Some(&provider)).await })
    }))
    .await;

    let outcomes: Vec<_> = outcomes
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let created = outcomes.iter().filter(|o| !o.already_exists).count();
    assert_eq!(created, 1);
    let first = outcomes[0].job_id();
    assert!(outcomes.iter().all(|o| o.job_id() == first));
    assert_eq!(repo.list_jobs(None, 100).await.unwrap().len(), 1);

    let document = artifacts.read(&outcomes[0].artifact).unwrap().unwrap();
    assert!(document.contains(PROCESSING_MESSAGE));
}

/// Two store handles on one database file still agree on a single job
#[tokio::test]
async fn test_acquire_withTwoConnections_shouldShareJob() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");
    let first = Repository::new(DatabaseConnection::new(&db_path).unwrap());
    let second = Repository::new(DatabaseConnection::new(&db_path).unwrap());
    let artifacts = Arc::new(FsArtifactStore::new(dir.path().join("artifacts")));

    let gate_a = DedupGate::new(first.clone(), artifacts.clone());
    let gate_b = DedupGate::new(second.clone(), artifacts.clone());
    let key = ContentKey::movie("tt0111161", "de", RequesterScope::Anonymous);

    let (a, b) = tokio::join!(gate_a.acquire(&key, None), gate_b.acquire(&key, None));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.job_id(), b.job_id());
    assert!(a.already_exists != b.already_exists);
    assert_eq!(
        first.find_job_by_key(&key.canonical()).await.unwrap().unwrap().id,
        second.find_job_by_key(&key.canonical()).await.unwrap().unwrap().id
    );
}

/// Different scopes and languages never share a job
#[tokio::test]
async fn test_requestSubtitle_withDifferentScopes_shouldCreateSeparateJobs() {
    let harness = Harness::scripted(ScriptedBackend::working(), 60);
    harness
        .source
        .insert("tt0111161", None, None, "en", common::srt_document(3));

    let anonymous = harness
        .controller
        .request_subtitle("tt0111161", "es", RequesterScope::Anonymous, None)
        .await
        .unwrap();
    let private = harness
        .controller
        .request_subtitle(
            "tt0111161",
            "es",
            RequesterScope::from_password(Some("secret")),
            None,
        )
        .await
        .unwrap();
    let other_language = harness
        .controller
        .request_subtitle("tt0111161", "it", RequesterScope::Anonymous, None)
        .await
        .unwrap();
    let repeated = harness
        .controller
        .request_subtitle("tt0111161", "spa", RequesterScope::Anonymous, None)
        .await
        .unwrap();

    assert!(anonymous.created && private.created && other_language.created);
    assert_ne!(anonymous.job_id, private.job_id);
    assert_ne!(anonymous.job_id, other_language.job_id);
    assert_ne!(anonymous.artifact, private.artifact);
    assert!(!repeated.created);
    assert_eq!(repeated.job_id, anonymous.job_id);

    harness.controller.shutdown_idle().await;
    let jobs = harness.controller.list_jobs(Some(JobStatus::Completed), 10).await.unwrap();
    assert_eq!(jobs.len(), 3);
}
