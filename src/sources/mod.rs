/*!
 * Subtitle sources.
 *
 * A source finds candidate subtitles for a content key and downloads the
 * chosen one. Implementations:
 * - `opensubtitles`: OpenSubtitles v3 addon API
 * - `local`: fixed documents for the CLI and tests
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::ContentKey;
use crate::errors::PipelineError;

pub mod local;
pub mod opensubtitles;

pub use local::{MemorySource, StaticSource};
pub use opensubtitles::OpenSubtitlesSource;

/// One downloadable subtitle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSubtitle {
    pub url: String,
    /// Language code as reported by the source
    pub language: String,
}

/// Where source subtitles come from
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    /// Candidates for the key, best first; empty when none exist
    async fn search(&self, key: &ContentKey) -> Result<Vec<SourceSubtitle>, PipelineError>;

    /// Raw SRT document of one candidate
    async fn download(&self, subtitle: &SourceSubtitle) -> Result<String, PipelineError>;
}
