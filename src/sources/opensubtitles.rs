use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{SourceSubtitle, SubtitleSource};
use crate::app_config::SourceConfig;
use crate::content::{ContentKey, MediaKind};
use crate::errors::PipelineError;
use crate::language_utils::languages_match;

/// Delay before the single retry of a 520 answer
const RETRY_520_DELAY: Duration = Duration::from_secs(2);

/// Client for the OpenSubtitles v3 addon API
#[derive(Debug, Clone)]
pub struct OpenSubtitlesSource {
    /// HTTP client for making requests
    client: Client,
    /// Base URL ending with a slash
    base_url: String,
    /// Wait before retrying a 520 answer
    retry_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    subtitles: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    url: String,
    lang: String,
}

impl OpenSubtitlesSource {
    pub fn new(config: &SourceConfig) -> Self {
        let mut base_url = config.opensubtitles_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url,
            retry_delay: RETRY_520_DELAY,
        }
    }

    /// Search URL for a key
    pub fn search_url(&self, key: &ContentKey) -> String {
        match (key.media_kind(), key.season, key.episode) {
            (MediaKind::Series, Some(season), Some(episode)) => format!(
                "{}series/{}:{}:{}.json",
                self.base_url, key.media_id, season, episode
            ),
            _ => format!("{}movie/{}.json", self.base_url, key.media_id),
        }
    }

    /// Pick one entry: target language, then English, then the first
    fn select(entries: Vec<SearchEntry>, language: &str) -> Vec<SourceSubtitle> {
        let pick = entries
            .iter()
            .position(|e| languages_match(&e.lang, language))
            .or_else(|| entries.iter().position(|e| languages_match(&e.lang, "en")))
            .or(if entries.is_empty() { None } else { Some(0) });

        pick.and_then(|i| entries.into_iter().nth(i))
            .map(|e| SourceSubtitle {
                url: e.url,
                language: e.lang,
            })
            .into_iter()
            .collect()
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, PipelineError> {
        let send = || async {
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| PipelineError::SourceFetch(e.to_string()))
        };

        let mut response = send().await?;
        if response.status().as_u16() == 520 {
            warn!("Subtitle source answered 520, retrying in {:?}", self.retry_delay);
            tokio::time::sleep(self.retry_delay).await;
            response = send().await?;
        }
        Ok(response)
    }
}

#[async_trait]
impl SubtitleSource for OpenSubtitlesSource {
    async fn search(&self, key: &ContentKey) -> Result<Vec<SourceSubtitle>, PipelineError> {
        let url = self.search_url(key);
        debug!("Searching subtitles: {}", url);

        let response = self.fetch(&url).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(PipelineError::SourceFetch(format!(
                "Subtitle search failed with status {}",
                status
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("Invalid search response: {}", e)))?;

        Ok(Self::select(parsed.subtitles, &key.language))
    }

    async fn download(&self, subtitle: &SourceSubtitle) -> Result<String, PipelineError> {
        let response = self.fetch(&subtitle.url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceFetch(format!(
                "Subtitle download failed with status {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::SourceFetch(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
