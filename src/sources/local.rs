use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

use super::{SourceSubtitle, SubtitleSource};
use crate::content::ContentKey;
use crate::errors::PipelineError;

// @module: Sources that serve documents held in memory

const STATIC_URL: &str = "static://source.srt";
const MEMORY_SCHEME: &str = "memory://";

/// Serves one fixed document for every key
#[derive(Debug, Clone)]
pub struct StaticSource {
    document: String,
    language: String,
}

impl StaticSource {
    pub fn new(document: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            language: language.into(),
        }
    }

    /// Read the document from an SRT file
    pub fn from_file<P: AsRef<Path>>(path: P, language: impl Into<String>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read source file {:?}: {}", path, e))?;
        Ok(Self::new(document, language))
    }
}

#[async_trait]
impl SubtitleSource for StaticSource {
    async fn search(&self, _key: &ContentKey) -> Result<Vec<SourceSubtitle>, PipelineError> {
        Ok(vec![SourceSubtitle {
            url: STATIC_URL.to_string(),
            language: self.language.clone(),
        }])
    }

    async fn download(&self, _subtitle: &SourceSubtitle) -> Result<String, PipelineError> {
        Ok(self.document.clone())
    }
}

/// Serves documents registered per media id, season and episode
#[derive(Debug, Default)]
pub struct MemorySource {
    // @field: media key -> (language, document)
    documents: Mutex<HashMap<String, (String, String)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn media_key(media_id: &str, season: Option<u32>, episode: Option<u32>) -> String {
        let part = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_default();
        format!("{}:{}:{}", media_id, part(season), part(episode))
    }

    /// Register the document served for a title
    pub fn insert(
        &self,
        media_id: &str,
        season: Option<u32>,
        episode: Option<u32>,
        language: &str,
        document: impl Into<String>,
    ) {
        self.documents.lock().insert(
            Self::media_key(media_id, season, episode),
            (language.to_string(), document.into()),
        );
    }
}

#[async_trait]
impl SubtitleSource for MemorySource {
    async fn search(&self, key: &ContentKey) -> Result<Vec<SourceSubtitle>, PipelineError> {
        let media_key = Self::media_key(&key.media_id, key.season, key.episode);
        let documents = self.documents.lock();

        Ok(documents
            .get(&media_key)
            .map(|(language, _)| SourceSubtitle {
                url: format!("{}{}", MEMORY_SCHEME, media_key),
                language: language.clone(),
            })
            .into_iter()
            .collect())
    }

    async fn download(&self, subtitle: &SourceSubtitle) -> Result<String, PipelineError> {
        let media_key = subtitle.url.trim_start_matches(MEMORY_SCHEME);
        self.documents
            .lock()
            .get(media_key)
            .map(|(_, document)| document.clone())
            .ok_or_else(|| PipelineError::SourceFetch(format!("No document at {}", subtitle.url)))
    }
}
