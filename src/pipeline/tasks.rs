use serde::{Deserialize, Serialize};

use crate::app_config::ProviderConfig;
use crate::sources::SourceSubtitle;

// @module: Task payloads carried by the work queues

/// Drive one job from source fetch to queued batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationTask {
    pub job_id: i64,
    pub target_language: String,
    pub provider: ProviderConfig,
    // @field: Preselected source; searched through the source when absent
    #[serde(default)]
    pub source: Option<SourceSubtitle>,
}

/// Translate one persisted batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub batch_id: i64,
    pub job_id: i64,
    pub batch_number: u32,
    pub target_language: String,
    pub provider: ProviderConfig,
}
