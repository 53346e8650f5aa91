/*!
 * Database entity models and DTOs.
 *
 * These structures map directly to the job and batch tables and provide
 * type-safe access to persisted data.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::subtitle_processor::Cue;

/// Lifecycle status of a translation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Source is being fetched or batches are being translated
    Processing,
    /// Final artifact written
    Completed,
    /// Source missing or a batch failed terminally
    Failed,
    /// Content identity needs a human decision
    ManualSearch,
}

impl JobStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `processing` fans out to the three outcomes; `failed` and
    /// `manual_search` only come back through an explicit reprocess.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Processing, Completed)
                | (Processing, Failed)
                | (Processing, ManualSearch)
                | (Failed, Processing)
                | (ManualSearch, Processing)
        )
    }

    /// Statuses that no worker will move on its own
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::ManualSearch => write!(f, "manual_search"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "manual_search" => Ok(JobStatus::ManualSearch),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Status of one subtitle batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created, not yet picked up
    Pending,
    /// Claimed by a worker
    Processing,
    /// Translated entries stored
    Completed,
    /// Exhausted its attempts or cancelled by the cascade
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Processing => write!(f, "processing"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BatchStatus::Pending),
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid batch status: {}", s)),
        }
    }
}

/// Fields needed to create a job row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Canonical content key string
    pub content_key: String,
    pub media_id: String,
    /// `movie` or `series`
    pub media_kind: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub language: String,
    /// `anonymous` or the credential hash
    pub scope: String,
    /// Relative artifact locator
    pub artifact_path: String,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Translation job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Row id
    pub id: i64,
    /// Canonical content key string
    pub content_key: String,
    pub media_id: String,
    pub media_kind: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub language: String,
    pub scope: String,
    /// Current status
    pub status: JobStatus,
    /// Times the job was reprocessed
    pub retry_attempts: u32,
    /// Usage cost summed over batches at finalization
    pub usage_total: u64,
    /// Relative artifact locator
    pub artifact_path: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Reason of the last failure
    pub error_message: Option<String>,
    /// RFC 3339 timestamps
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub last_retry_at: Option<String>,
}

/// Fields needed to create a batch row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBatch {
    /// 1-based, ordered
    pub batch_number: u32,
    /// Source cues, ordered by global index
    pub entries: Vec<Cue>,
}

impl NewBatch {
    pub fn first_index(&self) -> usize {
        self.entries.first().map(|c| c.global_index).unwrap_or(0)
    }

    pub fn last_index(&self) -> usize {
        self.entries.last().map(|c| c.global_index).unwrap_or(0)
    }
}

/// Subtitle batch record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Row id
    pub id: i64,
    /// Owning job
    pub job_id: i64,
    /// 1-based, ordered
    pub batch_number: u32,
    /// Global index range covered, inclusive
    pub first_index: usize,
    pub last_index: usize,
    /// Source cues
    pub source_entries: Vec<Cue>,
    /// Same shape as the source, present once completed
    pub translated_entries: Option<Vec<Cue>>,
    pub status: BatchStatus,
    /// Usage cost of this batch
    pub usage: u64,
    /// Worker claims so far
    pub attempts: u32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl BatchRecord {
    /// Source texts in cue order
    pub fn source_texts(&self) -> Vec<String> {
        self.source_entries.iter().map(|c| c.text.clone()).collect()
    }
}

/// Batch counts for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: u32,
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

impl BatchProgress {
    /// Completed share in the 0..=100 range
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} batches completed ({} pending, {} processing, {} failed)",
            self.completed, self.total, self.pending, self.processing, self.failed
        )
    }
}

/// Result of claiming a batch for processing
#[derive(Debug, Clone)]
pub enum BatchClaim {
    /// The caller owns this attempt
    Claimed(BatchRecord),
    /// A previous delivery already stored the translation
    AlreadyCompleted { job_id: i64 },
    /// The batch was failed or its job is no longer processing
    Cancelled { job_id: i64 },
    /// The batch row no longer exists (replaced by a reprocess)
    Missing,
}

/// Result of the one-shot failure cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// This call moved the job from processing to failed
    pub transitioned: bool,
    /// Sibling batches marked failed by this call
    pub batches_failed: usize,
}
