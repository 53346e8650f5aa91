/*!
 * Job lifecycle through the controller: status, listing, deletion,
 * reprocessing and manual search
 */

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use subflow::app_config::ProviderKind;
use subflow::artifacts::{FAILURE_MESSAGE, FsArtifactStore, PROCESSING_MESSAGE};
use subflow::content::{ContentKey, RequesterScope};
use subflow::database::models::JobStatus;
use subflow::database::{DatabaseConnection, Repository};
use subflow::errors::PipelineError;
use subflow::pipeline::DedupGate;
use subflow::pipeline::batching::partition;
use subflow::providers::mock::ScriptedBackend;
use subflow::subtitle_processor::parse_srt;

use crate::common::{self, Harness};

const WAIT: Duration = Duration::from_secs(20);

#[tokio::test]
async fn test_jobStatus_listAndDelete_shouldReflectStore() {
    let harness = Harness::scripted(ScriptedBackend::working(), 60);
    harness
        .source
        .insert("tt0944947", Some(1), Some(1), "en", common::srt_document(12));

    let outcome = assert_ok!(
        harness
            .controller
            .request_subtitle("tt0944947:1:1", "fr", RequesterScope::Anonymous, None)
            .await
    );
    let job = assert_ok!(harness.controller.wait_for_job(outcome.job_id, WAIT, |_, _| {}).await);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.media_kind, "series");
    assert_eq!((job.season, job.episode), (Some(1), Some(1)));

    let (job, progress) = assert_ok!(harness.controller.job_status(outcome.job_id).await);
    assert_eq!(progress.total, 1);
    assert_eq!(progress.percent(), 100.0);
    assert!(job.completed_at.is_some());

    let completed = assert_ok!(harness.controller.list_jobs(Some(JobStatus::Completed), 10).await);
    assert_eq!(completed.len(), 1);
    let failed = assert_ok!(harness.controller.list_jobs(Some(JobStatus::Failed), 10).await);
    assert!(failed.is_empty());

    let stats = assert_ok!(harness.controller.store_stats().await);
    assert_eq!((stats.job_count, stats.processing_jobs, stats.batch_count), (1, 0, 1));

    assert!(assert_ok!(harness.controller.delete_job(outcome.job_id).await));
    assert!(!assert_ok!(harness.controller.delete_job(outcome.job_id).await));
    let missing = assert_err!(harness.controller.job_status(outcome.job_id).await);
    assert!(matches!(missing, PipelineError::JobNotFound(_)));
    assert!(assert_ok!(harness.repo.batches_for_job(outcome.job_id).await).is_empty());
}

/// A failed job can be reprocessed with another provider
#[tokio::test]
async fn test_reprocess_afterFailure_shouldCompleteWithNewProvider() {
    let harness = Harness::scripted(ScriptedBackend::failing(), 60);
    let gemini = ScriptedBackend::working();
    harness.registry.register(ProviderKind::Gemini, Arc::new(gemini.clone()));
    harness
        .source
        .insert("tt0133093", None, None, "en", common::srt_document(8));

    let outcome = assert_ok!(
        harness
            .controller
            .request_subtitle("tt0133093", "de", RequesterScope::Anonymous, None)
            .await
    );
    let failed = assert_ok!(harness.controller.wait_for_job(outcome.job_id, WAIT, |_, _| {}).await);
    assert_eq!(failed.status, JobStatus::Failed);
    harness.controller.shutdown_idle().await;
    assert!(harness.artifact(outcome.job_id).await.contains(FAILURE_MESSAGE));

    let restarted = assert_ok!(
        harness
            .controller
            .reprocess(outcome.job_id, Some(ProviderKind::Gemini))
            .await
    );
    assert_eq!(restarted.status, JobStatus::Processing);
    assert_eq!(restarted.retry_attempts, 1);
    assert_eq!(restarted.provider.as_deref(), Some("gemini"));
    assert!(restarted.error_message.is_none());

    let job = assert_ok!(harness.controller.wait_for_job(outcome.job_id, WAIT, |_, _| {}).await);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(gemini.call_count(), 1);

    let cues = assert_ok!(parse_srt(&harness.artifact(outcome.job_id).await));
    assert_eq!(cues.len(), 8);
    assert_eq!(cues[0].text, "[de] Line 0");
}

/// Reprocessing is only allowed from failed or manual search
#[tokio::test]
async fn test_reprocess_withCompletedJob_shouldBeRejected() {
    let harness = Harness::scripted(ScriptedBackend::working(), 60);
    harness
        .source
        .insert("tt0109830", None, None, "en", common::srt_document(3));

    let outcome = assert_ok!(
        harness
            .controller
            .request_subtitle("tt0109830", "it", RequesterScope::Anonymous, None)
            .await
    );
    assert_ok!(harness.controller.wait_for_job(outcome.job_id, WAIT, |_, _| {}).await);

    let error = assert_err!(harness.controller.reprocess(outcome.job_id, None).await);
    assert!(matches!(error, PipelineError::InvalidTransition { .. }));

    let error = assert_err!(harness.controller.reprocess(9_999, None).await);
    assert!(matches!(error, PipelineError::JobNotFound(9_999)));
}

/// Unrecognized stream ids wait in manual search until reprocessed
#[tokio::test]
async fn test_requestSubtitle_withUnknownId_shouldRouteToManualSearch() {
    let backend = ScriptedBackend::working();
    let harness = Harness::scripted(backend.clone(), 60);
    harness
        .source
        .insert("kisskh:99", None, None, "en", common::srt_document(4));

    let outcome = assert_ok!(
        harness
            .controller
            .request_subtitle("kisskh:99", "es", RequesterScope::Anonymous, None)
            .await
    );
    assert!(outcome.created);
    assert_eq!(outcome.status, JobStatus::ManualSearch);

    harness.controller.shutdown_idle().await;
    let (job, progress) = assert_ok!(harness.controller.job_status(outcome.job_id).await);
    assert_eq!(job.status, JobStatus::ManualSearch);
    assert!(job.error_message.unwrap_or_default().contains("kisskh:99"));
    assert_eq!(progress.total, 0);
    assert_eq!(backend.call_count(), 0);
    assert!(harness.artifact(outcome.job_id).await.contains(PROCESSING_MESSAGE));

    let again = assert_ok!(
        harness
            .controller
            .request_subtitle("kisskh:99", "es", RequesterScope::Anonymous, None)
            .await
    );
    assert!(!again.created);
    assert_eq!(again.status, JobStatus::ManualSearch);

    assert_ok!(harness.controller.reprocess(outcome.job_id, None).await);
    let job = assert_ok!(harness.controller.wait_for_job(outcome.job_id, WAIT, |_, _| {}).await);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(backend.call_count(), 1);
}

/// A source already in the target language is published untouched
#[tokio::test]
async fn test_requestSubtitle_withSourceInTargetLanguage_shouldPassThrough() {
    let backend = ScriptedBackend::working();
    let harness = Harness::scripted(backend.clone(), 60);
    let document = common::srt_document(6);
    harness
        .source
        .insert("tt0080684", None, None, "spa", document.clone());

    let outcome = assert_ok!(
        harness
            .controller
            .request_subtitle("tt0080684", "es", RequesterScope::Anonymous, None)
            .await
    );
    let job = assert_ok!(harness.controller.wait_for_job(outcome.job_id, WAIT, |_, _| {}).await);

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.usage_total, 0);
    assert_eq!(backend.call_count(), 0);
    assert_eq!(harness.artifact(outcome.job_id).await, document);
    assert!(harness.artifact_root().join(&job.artifact_path).exists());
}

/// Progress callbacks observe the job while it runs
#[tokio::test]
async fn test_waitForJob_shouldReportProgress() {
    let harness = Harness::scripted(ScriptedBackend::slow(20), 2);
    harness
        .source
        .insert("tt0120737", None, None, "en", common::srt_document(10));

    let outcome = assert_ok!(
        harness
            .controller
            .request_subtitle("tt0120737", "nl", RequesterScope::Anonymous, None)
            .await
    );

    let mut polls = 0;
    let mut last_total = 0;
    let job = assert_ok!(
        harness
            .controller
            .wait_for_job(outcome.job_id, WAIT, |_, progress| {
                polls += 1;
                last_total = progress.total;
            })
            .await
    );

    assert_eq!(job.status, JobStatus::Completed);
    assert!(polls >= 1);
    assert_eq!(last_total, 5);
}

/// Jobs an exited process left processing are finished after a restart
#[tokio::test]
async fn test_resumeInterrupted_afterRestart_shouldFinishJob() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");
    let artifact_root = dir.path().join("artifacts");
    let key = ContentKey::movie("tt0111161", "es", RequesterScope::Anonymous);

    // Admitted and batched, then the process went away with its queues
    let job_id = {
        let repo = Repository::new(assert_ok!(DatabaseConnection::new(&db_path)));
        let gate = DedupGate::new(repo.clone(), Arc::new(FsArtifactStore::new(&artifact_root)));
        let acquired = assert_ok!(gate.acquire(&key, Some(&common::openai_provider(60))).await);
        let cues = assert_ok!(parse_srt(&common::srt_document(130)));
        assert_ok!(repo.replace_batches(acquired.job_id(), partition(&cues, 10)).await);
        acquired.job_id()
    };

    let backend = ScriptedBackend::working();
    let harness = Harness::reopen(Arc::new(backend.clone()), 60, &db_path, &artifact_root);
    harness
        .source
        .insert("tt0111161", None, None, "en", common::srt_document(130));

    let (job, _) = assert_ok!(harness.controller.job_status(job_id).await);
    assert_eq!(job.status, JobStatus::Processing);

    assert_eq!(assert_ok!(harness.controller.resume_interrupted().await), 1);
    let job = assert_ok!(harness.controller.wait_for_job(job_id, WAIT, |_, _| {}).await);
    harness.controller.shutdown_idle().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(backend.call_count(), 3);
    assert_eq!(assert_ok!(harness.repo.batches_for_job(job_id).await).len(), 3);
    let cues = assert_ok!(parse_srt(&harness.artifact(job_id).await));
    assert_eq!(cues.len(), 130);
    assert_eq!(cues[129].text, "[es] Line 129");

    let again = assert_ok!(
        harness
            .controller
            .request_subtitle("tt0111161", "es", RequesterScope::Anonymous, None)
            .await
    );
    assert!(!again.created);
    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(assert_ok!(harness.controller.resume_interrupted().await), 0);
}
