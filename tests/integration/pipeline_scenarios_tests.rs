/*!
 * End-to-end pipeline scenarios: batching, failure cascade, mismatch
 * recovery and ordered assembly
 */

use std::sync::Arc;
use std::time::Duration;

use subflow::artifacts::{FAILURE_MESSAGE, PROCESSING_MESSAGE};
use subflow::content::RequesterScope;
use subflow::database::models::{BatchStatus, JobStatus};
use subflow::errors::ProviderError;
use subflow::pipeline::{AssemblyEngine, AssemblyOutcome};
use subflow::providers::mock::{MOCK_USAGE_PER_CALL, ScriptedBackend, ScriptedReply};
use subflow::subtitle_processor::parse_srt;

use crate::common::{self, Harness, JitterBackend, POISON, PoisonBackend};

const WAIT: Duration = Duration::from_secs(20);

async fn run_movie(harness: &Harness, media_id: &str, document: String) -> i64 {
    harness.source.insert(media_id, None, None, "en", document);
    let outcome = harness
        .controller
        .request_subtitle(media_id, "es", RequesterScope::Anonymous, None)
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.status, JobStatus::Processing);

    harness
        .controller
        .wait_for_job(outcome.job_id, WAIT, |_, _| {})
        .await
        .unwrap();
    harness.controller.shutdown_idle().await;
    outcome.job_id
}

/// 130 cues at 60 per batch become three batches and one ordered document
#[tokio::test]
async fn test_pipeline_withThreeBatches_shouldAssembleInOrder() {
    let backend = ScriptedBackend::working();
    let harness = Harness::scripted(backend.clone(), 60);

    let job_id = run_movie(&harness, "tt0111161", common::srt_document(130)).await;

    let (job, progress) = harness.controller.job_status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(progress.total, 3);
    assert_eq!(progress.completed, 3);
    assert_eq!(job.usage_total, 3 * MOCK_USAGE_PER_CALL);

    let batches = harness.repo.batches_for_job(job_id).await.unwrap();
    let sizes: Vec<usize> = batches.iter().map(|b| b.source_entries.len()).collect();
    assert_eq!(sizes, vec![60, 60, 10]);
    assert_eq!(backend.call_count(), 3);

    let cues = parse_srt(&harness.artifact(job_id).await).unwrap();
    assert_eq!(cues.len(), 130);
    for (i, cue) in cues.iter().enumerate() {
        assert_eq!(cue.text, format!("[es] Line {}", i));
        assert_eq!(cue.counter, (i + 1).to_string());
    }
}

/// One batch failing terminally fails the job and every sibling batch
#[tokio::test]
async fn test_pipeline_withPoisonedBatch_shouldCascadeFailure() {
    let harness = Harness::new(Arc::new(PoisonBackend), 60);
    let document = common::srt_document(130).replace("\nLine 70\n", &format!("\nLine {}\n", POISON));

    let job_id = run_movie(&harness, "tt0068646", document).await;

    let (job, progress) = harness.controller.job_status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap_or_default().contains("batch 2 failed"));
    assert_eq!(progress.failed, 3);
    assert_eq!(progress.completed, 0);

    let batches = harness.repo.batches_for_job(job_id).await.unwrap();
    assert!(batches.iter().all(|b| b.status == BatchStatus::Failed));

    let artifact = harness.artifact(job_id).await;
    assert!(artifact.contains(FAILURE_MESSAGE));
    assert!(!artifact.contains("[es] Line 0"));
}

/// Short answers are recovered by re-asking with the misaligned answer
#[tokio::test]
async fn test_pipeline_withShortAnswers_shouldRecoverBatch() {
    let backend = ScriptedBackend::working()
        .with_script([ScriptedReply::Truncate(9), ScriptedReply::Truncate(8)]);
    let harness = Harness::scripted(backend.clone(), 60);

    let job_id = run_movie(&harness, "tt0050083", common::srt_document(10)).await;

    let job = harness.repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.usage_total, 3 * MOCK_USAGE_PER_CALL);

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].partial.is_none());
    assert_eq!(requests[1].partial.as_ref().map(Vec::len), Some(9));
    assert_eq!(requests[2].partial.as_ref().map(Vec::len), Some(8));

    let batch = &harness.repo.batches_for_job(job_id).await.unwrap()[0];
    assert_eq!(batch.usage, 3 * MOCK_USAGE_PER_CALL);
    assert_eq!(parse_srt(&harness.artifact(job_id).await).unwrap().len(), 10);
}

/// A backend that never returns the full count fails the job after the budget
#[tokio::test]
async fn test_pipeline_withPersistentMismatch_shouldFailJob() {
    let backend = ScriptedBackend::short_by(1);
    let harness = Harness::scripted(backend.clone(), 60);

    let job_id = run_movie(&harness, "tt0071562", common::srt_document(10)).await;

    let job = harness.repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap_or_default().contains("count mismatch"));
    assert_eq!(backend.call_count(), 3);
    assert!(harness.artifact(job_id).await.contains(FAILURE_MESSAGE));
}

/// Transient provider errors are retried inside the batch
#[tokio::test]
async fn test_pipeline_withTransientError_shouldRetryAndComplete() {
    let backend = ScriptedBackend::working().with_script([ScriptedReply::Fail(
        ProviderError::RateLimitExceeded("slow down".to_string()),
    )]);
    let harness = Harness::scripted(backend.clone(), 60);

    let job_id = run_movie(&harness, "tt0110912", common::srt_document(5)).await;

    let job = harness.repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(backend.call_count(), 2);
    assert_eq!(job.usage_total, MOCK_USAGE_PER_CALL);
}

/// Batches finishing in random order still assemble by global index
#[tokio::test]
async fn test_pipeline_withJitteredBatches_shouldKeepGlobalOrder() {
    let harness = Harness::new(Arc::new(JitterBackend), 7);

    let job_id = run_movie(&harness, "tt0167260", common::srt_document(200)).await;

    let (job, progress) = harness.controller.job_status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(progress.total, 29);
    assert_eq!(job.usage_total, 200);

    let cues = parse_srt(&harness.artifact(job_id).await).unwrap();
    let texts: Vec<String> = cues.iter().map(|c| c.text.clone()).collect();
    let expected: Vec<String> = (0..200).map(|i| format!("[es] Line {}", i)).collect();
    assert_eq!(texts, expected);
}

/// Assembling a finished job again changes nothing
#[tokio::test]
async fn test_assemble_afterCompletion_shouldBeIdempotent() {
    let harness = Harness::scripted(ScriptedBackend::working(), 4);
    let job_id = run_movie(&harness, "tt0060196", common::srt_document(10)).await;

    let before = harness.artifact(job_id).await;
    let usage_before = harness.repo.get_job(job_id).await.unwrap().unwrap().usage_total;

    let engine = AssemblyEngine::new(harness.repo.clone(), harness.artifacts.clone());
    let outcome = engine.assemble(job_id).await.unwrap();

    assert!(matches!(outcome, AssemblyOutcome::AlreadyFinalized));
    assert_eq!(harness.artifact(job_id).await, before);
    let job = harness.repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.usage_total, usage_before);
    assert_eq!(usage_before, 3 * MOCK_USAGE_PER_CALL);
    assert!(!before.contains(PROCESSING_MESSAGE));
}
