/*!
 * Repository layer for database operations.
 *
 * High-level API over the job and batch tables. Each method that changes
 * status is a single conditional statement or a single transaction, so the
 * pipeline can be redelivered and raced without corrupting a job:
 *
 * - `create_job_if_absent` relies on the UNIQUE content key
 * - `complete_batch` refuses to write once the job left `processing`
 * - `finalize_job` and `fail_job_cascade` only fire from `processing`
 */

use anyhow::Result;
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::connection::DatabaseConnection;
use super::models::{
    BatchClaim, BatchProgress, BatchRecord, BatchStatus, CascadeOutcome, JobRecord, JobStatus,
    NewBatch, NewJob,
};
use crate::errors::PipelineError;
use crate::subtitle_processor::Cue;

const JOB_COLUMNS: &str = "id, content_key, media_id, media_kind, season, episode, language, scope, \
     status, retry_attempts, usage_total, artifact_path, provider, model, error_message, \
     created_at, updated_at, completed_at, last_retry_at";

const BATCH_COLUMNS: &str = "id, job_id, batch_number, first_index, last_index, source_entries, \
     translated_entries, status, usage, attempts, error_message, created_at, completed_at";

/// Message stored on siblings failed by the cascade
const CASCADE_MESSAGE: &str = "cancelled: a sibling batch failed";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        content_key: row.get(1)?,
        media_id: row.get(2)?,
        media_kind: row.get(3)?,
        season: row.get(4)?,
        episode: row.get(5)?,
        language: row.get(6)?,
        scope: row.get(7)?,
        status: row
            .get::<_, String>(8)?
            .parse()
            .unwrap_or(JobStatus::Failed),
        retry_attempts: row.get(9)?,
        usage_total: row.get::<_, i64>(10)? as u64,
        artifact_path: row.get(11)?,
        provider: row.get(12)?,
        model: row.get(13)?,
        error_message: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        completed_at: row.get(17)?,
        last_retry_at: row.get(18)?,
    })
}

fn batch_from_row(row: &Row) -> rusqlite::Result<BatchRecord> {
    let translated: Option<String> = row.get(6)?;
    let translated_entries = match translated {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };

    Ok(BatchRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        batch_number: row.get(2)?,
        first_index: row.get::<_, i64>(3)? as usize,
        last_index: row.get::<_, i64>(4)? as usize,
        source_entries: json_column(row, 5)?,
        translated_entries,
        status: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or(BatchStatus::Failed),
        usage: row.get::<_, i64>(8)? as u64,
        attempts: row.get(9)?,
        error_message: row.get(10)?,
        created_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Insert a job unless one already exists for its content key.
    ///
    /// Returns the stored job and whether this call created it. The UNIQUE
    /// constraint on `content_key` makes this safe across processes too.
    pub async fn create_job_if_absent(&self, job: &NewJob) -> Result<(JobRecord, bool)> {
        let job = job.clone();

        self.db
            .transaction_async(move |tx| {
                let now = now();
                let inserted = tx.execute(
                    r#"
                    INSERT INTO translation_jobs (
                        content_key, media_id, media_kind, season, episode, language, scope,
                        status, artifact_path, provider, model, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'processing', ?8, ?9, ?10, ?11, ?11)
                    ON CONFLICT(content_key) DO NOTHING
                    "#,
                    params![
                        job.content_key,
                        job.media_id,
                        job.media_kind,
                        job.season,
                        job.episode,
                        job.language,
                        job.scope,
                        job.artifact_path,
                        job.provider,
                        job.model,
                        now,
                    ],
                )?;

                let record = Self::find_job_by_key_sync(tx, &job.content_key)?
                    .ok_or_else(|| anyhow::anyhow!("Job vanished after insert: {}", job.content_key))?;

                Ok((record, inserted == 1))
            })
            .await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>> {
        self.db
            .execute_async(move |conn| Self::get_job_sync(conn, job_id))
            .await
    }

    fn get_job_sync(conn: &Connection, job_id: i64) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM translation_jobs WHERE id = ?1", JOB_COLUMNS);
        Ok(conn.query_row(&sql, [job_id], job_from_row).optional()?)
    }

    /// Get a job by its canonical content key
    pub async fn find_job_by_key(&self, content_key: &str) -> Result<Option<JobRecord>> {
        let content_key = content_key.to_string();
        self.db
            .execute_async(move |conn| Self::find_job_by_key_sync(conn, &content_key))
            .await
    }

    fn find_job_by_key_sync(conn: &Connection, content_key: &str) -> Result<Option<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM translation_jobs WHERE content_key = ?1",
            JOB_COLUMNS
        );
        Ok(conn.query_row(&sql, [content_key], job_from_row).optional()?)
    }

    /// List jobs, most recently updated first
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<JobRecord>> {
        self.db
            .execute_async(move |conn| {
                let limit = limit as i64;
                let jobs = match status {
                    Some(status) => {
                        let sql = format!(
                            "SELECT {} FROM translation_jobs WHERE status = ?1 ORDER BY updated_at DESC, id DESC LIMIT ?2",
                            JOB_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt.query_map(params![status.to_string(), limit], job_from_row)?;
                        rows.collect::<rusqlite::Result<Vec<_>>>()?
                    }
                    None => {
                        let sql = format!(
                            "SELECT {} FROM translation_jobs ORDER BY updated_at DESC, id DESC LIMIT ?1",
                            JOB_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt.query_map([limit], job_from_row)?;
                        rows.collect::<rusqlite::Result<Vec<_>>>()?
                    }
                };
                Ok(jobs)
            })
            .await
    }

    /// Delete a job and, through the foreign key, its batches
    pub async fn delete_job(&self, job_id: i64) -> Result<bool> {
        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute("DELETE FROM translation_jobs WHERE id = ?1", [job_id])?;
                Ok(deleted > 0)
            })
            .await
    }

    /// `processing -> manual_search`; false when the job was elsewhere
    pub async fn mark_manual_search(&self, job_id: i64, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    r#"
                    UPDATE translation_jobs
                    SET status = 'manual_search', error_message = ?2, updated_at = ?3
                    WHERE id = ?1 AND status = 'processing'
                    "#,
                    params![job_id, reason, now()],
                )?;
                Ok(updated == 1)
            })
            .await
    }

    /// Move a `failed` or `manual_search` job back to `processing`.
    ///
    /// Prior batches are deleted and `retry_attempts` incremented in the same
    /// transaction. Any other starting status is an invalid transition.
    pub async fn begin_reprocess(
        &self,
        job_id: i64,
        provider: Option<String>,
        model: Option<String>,
    ) -> Result<JobRecord> {
        self.db
            .transaction_async(move |tx| {
                let job = Self::get_job_sync(tx, job_id)?
                    .ok_or(PipelineError::JobNotFound(job_id))?;

                if !job.status.can_transition_to(JobStatus::Processing) {
                    return Err(PipelineError::InvalidTransition {
                        from: job.status.to_string(),
                        to: JobStatus::Processing.to_string(),
                    }
                    .into());
                }

                let now = now();
                tx.execute(
                    r#"
                    UPDATE translation_jobs
                    SET status = 'processing',
                        retry_attempts = retry_attempts + 1,
                        last_retry_at = ?2,
                        updated_at = ?2,
                        completed_at = NULL,
                        error_message = NULL,
                        usage_total = 0,
                        provider = COALESCE(?3, provider),
                        model = COALESCE(?4, model)
                    WHERE id = ?1
                    "#,
                    params![job_id, now, provider, model],
                )?;
                let cleared = tx.execute("DELETE FROM subtitle_batches WHERE job_id = ?1", [job_id])?;
                debug!("Reprocess of job {} cleared {} batches", job_id, cleared);

                Self::get_job_sync(tx, job_id)?
                    .ok_or_else(|| PipelineError::JobNotFound(job_id).into())
            })
            .await
    }

    /// `processing -> completed`, writing the artifact inside the transaction.
    ///
    /// The update only matches while the job is `processing` and every batch
    /// is `completed`; `write_artifact` runs only when it matched, and an
    /// error from it rolls the transition back. Returns whether this call
    /// finalized the job.
    pub async fn finalize_job<W>(&self, job_id: i64, usage_total: u64, write_artifact: W) -> Result<bool>
    where
        W: FnOnce() -> Result<()> + Send + 'static,
    {
        self.db
            .transaction_async(move |tx| {
                let now = now();
                let updated = tx.execute(
                    r#"
                    UPDATE translation_jobs
                    SET status = 'completed', usage_total = ?2, completed_at = ?3,
                        updated_at = ?3, error_message = NULL
                    WHERE id = ?1
                      AND status = 'processing'
                      AND NOT EXISTS (
                          SELECT 1 FROM subtitle_batches
                          WHERE job_id = ?1 AND status != 'completed'
                      )
                    "#,
                    params![job_id, usage_total as i64, now],
                )?;

                if updated == 0 {
                    return Ok(false);
                }

                write_artifact()?;
                Ok(true)
            })
            .await
    }

    /// One-shot failure cascade.
    ///
    /// Moves the job `processing -> failed` and marks every other batch of
    /// the job failed, completed ones included. A second call for the same
    /// job is a no-op because the job no longer matches `processing`.
    pub async fn fail_job_cascade(
        &self,
        job_id: i64,
        reason: &str,
        failed_batch_id: Option<i64>,
    ) -> Result<CascadeOutcome> {
        let reason = reason.to_string();

        self.db
            .transaction_async(move |tx| {
                let now = now();
                let transitioned = tx.execute(
                    r#"
                    UPDATE translation_jobs
                    SET status = 'failed', error_message = ?2, updated_at = ?3
                    WHERE id = ?1 AND status = 'processing'
                    "#,
                    params![job_id, reason, now],
                )?;

                if transitioned == 0 {
                    return Ok(CascadeOutcome {
                        transitioned: false,
                        batches_failed: 0,
                    });
                }

                let batches_failed = tx.execute(
                    r#"
                    UPDATE subtitle_batches
                    SET status = 'failed',
                        error_message = CASE WHEN id = ?2 THEN ?3 ELSE ?4 END
                    WHERE job_id = ?1 AND status != 'failed'
                    "#,
                    params![job_id, failed_batch_id, reason, CASCADE_MESSAGE],
                )?;

                Ok(CascadeOutcome {
                    transitioned: true,
                    batches_failed,
                })
            })
            .await
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Replace every batch of a job with a fresh set.
    ///
    /// Runs as one transaction and only while the job is `processing`;
    /// returns `None` otherwise so a stale redelivery creates nothing.
    pub async fn replace_batches(&self, job_id: i64, batches: Vec<NewBatch>) -> Result<Option<Vec<BatchRecord>>> {
        self.db
            .transaction_async(move |tx| {
                let status: Option<String> = tx
                    .query_row(
                        "SELECT status FROM translation_jobs WHERE id = ?1",
                        [job_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                if status.as_deref() != Some("processing") {
                    return Ok(None);
                }

                tx.execute("DELETE FROM subtitle_batches WHERE job_id = ?1", [job_id])?;

                let now = now();
                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT INTO subtitle_batches (
                            job_id, batch_number, first_index, last_index, source_entries,
                            status, created_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
                        "#,
                    )?;

                    for batch in &batches {
                        let entries = serde_json::to_string(&batch.entries)?;
                        stmt.execute(params![
                            job_id,
                            batch.batch_number,
                            batch.first_index() as i64,
                            batch.last_index() as i64,
                            entries,
                            now,
                        ])?;
                    }
                }

                Ok(Some(Self::batches_for_job_sync(tx, job_id)?))
            })
            .await
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, batch_id: i64) -> Result<Option<BatchRecord>> {
        self.db
            .execute_async(move |conn| Self::get_batch_sync(conn, batch_id))
            .await
    }

    fn get_batch_sync(conn: &Connection, batch_id: i64) -> Result<Option<BatchRecord>> {
        let sql = format!("SELECT {} FROM subtitle_batches WHERE id = ?1", BATCH_COLUMNS);
        Ok(conn.query_row(&sql, [batch_id], batch_from_row).optional()?)
    }

    /// All batches of a job ordered by batch number
    pub async fn batches_for_job(&self, job_id: i64) -> Result<Vec<BatchRecord>> {
        self.db
            .execute_async(move |conn| Self::batches_for_job_sync(conn, job_id))
            .await
    }

    fn batches_for_job_sync(conn: &Connection, job_id: i64) -> Result<Vec<BatchRecord>> {
        let sql = format!(
            "SELECT {} FROM subtitle_batches WHERE job_id = ?1 ORDER BY batch_number",
            BATCH_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([job_id], batch_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Claim a batch for a processing attempt
    pub async fn claim_batch(&self, batch_id: i64) -> Result<BatchClaim> {
        self.db
            .transaction_async(move |tx| {
                let state: Option<(i64, String, String)> = tx
                    .query_row(
                        r#"
                        SELECT b.job_id, b.status, j.status
                        FROM subtitle_batches b
                        JOIN translation_jobs j ON j.id = b.job_id
                        WHERE b.id = ?1
                        "#,
                        [batch_id],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;

                let Some((job_id, batch_status, job_status)) = state else {
                    return Ok(BatchClaim::Missing);
                };

                if batch_status == "completed" {
                    return Ok(BatchClaim::AlreadyCompleted { job_id });
                }
                if batch_status == "failed" || job_status != "processing" {
                    return Ok(BatchClaim::Cancelled { job_id });
                }

                tx.execute(
                    "UPDATE subtitle_batches SET status = 'processing', attempts = attempts + 1 WHERE id = ?1",
                    [batch_id],
                )?;

                match Self::get_batch_sync(tx, batch_id)? {
                    Some(batch) => Ok(BatchClaim::Claimed(batch)),
                    None => Ok(BatchClaim::Missing),
                }
            })
            .await
    }

    /// Store a batch translation and mark it completed.
    ///
    /// Matches only a `processing` batch whose job is still `processing`, so
    /// a batch can never report success after the cascade failed its job.
    pub async fn complete_batch(&self, batch_id: i64, translated: &[Cue], usage: u64) -> Result<bool> {
        let translated = serde_json::to_string(translated)?;

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    r#"
                    UPDATE subtitle_batches
                    SET status = 'completed', translated_entries = ?2, usage = ?3,
                        completed_at = ?4, error_message = NULL
                    WHERE id = ?1
                      AND status = 'processing'
                      AND EXISTS (
                          SELECT 1 FROM translation_jobs j
                          WHERE j.id = subtitle_batches.job_id AND j.status = 'processing'
                      )
                    "#,
                    params![batch_id, translated, usage as i64, now()],
                )?;
                Ok(updated == 1)
            })
            .await
    }

    /// Batches of the job not yet completed, read fresh from the store
    pub async fn count_incomplete_batches(&self, job_id: i64) -> Result<i64> {
        self.db
            .execute_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM subtitle_batches WHERE job_id = ?1 AND status != 'completed'",
                    [job_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    /// Per-status batch counts of a job
    pub async fn batch_progress(&self, job_id: i64) -> Result<BatchProgress> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM subtitle_batches WHERE job_id = ?1 GROUP BY status",
                )?;
                let rows = stmt.query_map([job_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
                })?;

                let mut progress = BatchProgress::default();
                for row in rows {
                    let (status, count) = row?;
                    match status.parse::<BatchStatus>() {
                        Ok(BatchStatus::Pending) => progress.pending = count,
                        Ok(BatchStatus::Processing) => progress.processing = count,
                        Ok(BatchStatus::Completed) => progress.completed = count,
                        Ok(BatchStatus::Failed) => progress.failed = count,
                        Err(_) => {}
                    }
                    progress.total += count;
                }
                Ok(progress)
            })
            .await
    }
}
