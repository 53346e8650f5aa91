/*!
 * Content keys and requester scopes.
 *
 * A content key identifies one translation target. Its canonical string is
 * the dedup key of the job table, so two requests that should share a job
 * must produce the same canonical form.
 */

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::artifacts::ArtifactLocator;
use crate::database::models::{JobRecord, NewJob};
use crate::language_utils::normalize_language_code;

const ANONYMOUS: &str = "anonymous";

/// Who a translation is produced for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequesterScope {
    /// Shared output, visible to every anonymous requester
    Anonymous,
    /// Output bound to one credential; holds the sha256 hex of the password
    Credential(String),
}

impl RequesterScope {
    /// Scope for an optional password; an empty password is anonymous
    pub fn from_password(password: Option<&str>) -> Self {
        match password.map(str::trim) {
            Some(password) if !password.is_empty() => {
                Self::Credential(hex_digest(password.as_bytes()))
            }
            _ => Self::Anonymous,
        }
    }

    /// Rebuild a scope from its stored key part
    pub fn from_key_part(part: &str) -> Self {
        if part == ANONYMOUS || part.is_empty() {
            Self::Anonymous
        } else {
            Self::Credential(part.to_string())
        }
    }

    /// Form used inside the canonical content key
    pub fn key_part(&self) -> &str {
        match self {
            Self::Anonymous => ANONYMOUS,
            Self::Credential(hash) => hash,
        }
    }

    /// Top-level artifact directory for this scope
    pub fn directory(&self, language: &str) -> String {
        match self {
            Self::Anonymous => format!("translated-{}", language),
            Self::Credential(hash) => hash.clone(),
        }
    }
}

/// Lowercase sha256 hex of some bytes
pub fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Movie or series episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one translation target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub media_id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Normalized target language
    pub language: String,
    pub scope: RequesterScope,
}

impl ContentKey {
    /// Build a key, normalizing the language when it is a known code
    pub fn new(
        media_id: impl Into<String>,
        season: Option<u32>,
        episode: Option<u32>,
        language: &str,
        scope: RequesterScope,
    ) -> Self {
        let language = normalize_language_code(language)
            .unwrap_or_else(|_| language.trim().to_lowercase());

        Self {
            media_id: media_id.into(),
            season,
            episode,
            language,
            scope,
        }
    }

    pub fn movie(media_id: impl Into<String>, language: &str, scope: RequesterScope) -> Self {
        Self::new(media_id, None, None, language, scope)
    }

    pub fn episode(
        media_id: impl Into<String>,
        season: u32,
        episode: u32,
        language: &str,
        scope: RequesterScope,
    ) -> Self {
        Self::new(media_id, Some(season), Some(episode), language, scope)
    }

    /// Key of an existing job
    pub fn from_job(job: &JobRecord) -> Self {
        Self {
            media_id: job.media_id.clone(),
            season: job.season,
            episode: job.episode,
            language: job.language.clone(),
            scope: RequesterScope::from_key_part(&job.scope),
        }
    }

    /// Series only when both season and episode are known
    pub fn media_kind(&self) -> MediaKind {
        match (self.season, self.episode) {
            (Some(_), Some(_)) => MediaKind::Series,
            _ => MediaKind::Movie,
        }
    }

    /// `media_id:season:episode:language:scope`, empty parts for movies
    pub fn canonical(&self) -> String {
        let part = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{}:{}:{}:{}:{}",
            self.media_id,
            part(self.season),
            part(self.episode),
            self.language,
            self.scope.key_part()
        )
    }

    /// Where the rendered subtitle for this key lives below the artifact root
    pub fn artifact_locator(&self) -> ArtifactLocator {
        let scope_dir = self.scope.directory(&self.language);
        let path = match (self.season, self.episode) {
            (Some(season), Some(episode)) => format!(
                "{scope}/{lang}/{id}/season{season}/{id}-translated-{episode}-1.srt",
                scope = scope_dir,
                lang = self.language,
                id = self.media_id,
                season = season,
                episode = episode,
            ),
            _ => format!(
                "{scope}/{lang}/{id}/{id}-translated-1.srt",
                scope = scope_dir,
                lang = self.language,
                id = self.media_id,
            ),
        };
        ArtifactLocator::new(path)
    }

    /// Row to insert through the dedup gate
    pub fn to_new_job(&self, provider: Option<String>, model: Option<String>) -> NewJob {
        NewJob {
            content_key: self.canonical(),
            media_id: self.media_id.clone(),
            media_kind: self.media_kind().to_string(),
            season: self.season,
            episode: self.episode,
            language: self.language.clone(),
            scope: self.scope.key_part().to_string(),
            artifact_path: self.artifact_locator().as_str().to_string(),
            provider,
            model,
        }
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}
