/*!
 * Content identity resolution.
 *
 * Turns the opaque id a streaming client sends into a media id with
 * optional season and episode, plus a confidence. Low confidence routes
 * the job to manual search instead of translating the wrong content.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

static SERIES_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(tt\d+):(\d+):(\d+)$").unwrap());

static MOVIE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(tt\d+)$").unwrap());

/// Resolved identity of an opaque id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub media_id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// 0.0 ..= 1.0
    pub confidence: f32,
}

impl Resolution {
    /// Confidence below the threshold, as the error the facade reports
    pub fn check(&self, opaque_id: &str, min_confidence: f32) -> Result<(), PipelineError> {
        if self.confidence < min_confidence {
            Err(PipelineError::IdentityAmbiguous {
                opaque_id: opaque_id.to_string(),
                confidence: self.confidence,
            })
        } else {
            Ok(())
        }
    }
}

/// Maps client ids to content identities
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve(&self, opaque_id: &str) -> Result<Resolution, PipelineError>;
}

/// Resolver for IMDb-style stream ids (`tt123`, `tt123:1:2`)
#[derive(Debug, Default, Clone)]
pub struct StreamIdResolver;

impl StreamIdResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentResolver for StreamIdResolver {
    async fn resolve(&self, opaque_id: &str) -> Result<Resolution, PipelineError> {
        let id = opaque_id.trim();

        if let Some(caps) = SERIES_ID.captures(id) {
            let number = |i: usize| caps[i].parse::<u32>().ok();
            if let (Some(season), Some(episode)) = (number(2), number(3)) {
                return Ok(Resolution {
                    media_id: caps[1].to_string(),
                    season: Some(season),
                    episode: Some(episode),
                    confidence: 1.0,
                });
            }
        }

        if MOVIE_ID.is_match(id) {
            return Ok(Resolution {
                media_id: id.to_string(),
                season: None,
                episode: None,
                confidence: 1.0,
            });
        }

        Ok(Resolution {
            media_id: id.to_string(),
            season: None,
            episode: None,
            confidence: 0.0,
        })
    }
}
