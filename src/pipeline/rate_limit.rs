/*!
 * Provider rate limiting.
 *
 * One limiter exists per (provider kind, credential) pair for the whole
 * process. A limiter combines:
 * - a concurrency cap (semaphore slots, released when the permit drops)
 * - a minimum spacing between call starts
 * - an optional token reservoir reset to a fixed amount on an interval
 *
 * The registry is built once and handed to the workers explicitly.
 */

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::app_config::{ProviderConfig, ProviderKind, ReservoirConfig};
use crate::content::key::hex_digest;
use crate::errors::ProviderError;

/// Provider-specific admission profile with tuned defaults
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterProfile {
    /// Maximum concurrent calls
    pub max_concurrent: usize,
    /// Minimum time between two call starts
    pub min_spacing: Duration,
    /// Optional token budget per interval
    pub reservoir: Option<ReservoirConfig>,
}

impl LimiterProfile {
    /// Get the default profile for a given provider
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Gemini => Self {
                // Free tier allows a few hundred calls per minute
                max_concurrent: 40,
                min_spacing: Duration::from_millis(250),
                reservoir: Some(ReservoirConfig {
                    capacity: 280,
                    refill_amount: 280,
                    refill_interval_ms: 60_000,
                }),
            },
            ProviderKind::OpenAI => Self {
                max_concurrent: 20,
                min_spacing: Duration::from_millis(50),
                reservoir: None,
            },
            ProviderKind::DeepL => Self {
                max_concurrent: 10,
                min_spacing: Duration::from_millis(100),
                reservoir: None,
            },
            _ => Self {
                max_concurrent: 15,
                min_spacing: Duration::from_millis(75),
                reservoir: None,
            },
        }
    }

    /// Provider defaults with the config overrides applied
    pub fn for_config(config: &ProviderConfig) -> Self {
        let mut profile = Self::for_provider(config.provider_type);
        if let Some(max_concurrent) = config.max_concurrent {
            profile.max_concurrent = max_concurrent.max(1);
        }
        if let Some(spacing) = config.min_spacing_ms {
            profile.min_spacing = Duration::from_millis(spacing);
        }
        if config.reservoir.is_some() {
            profile.reservoir = config.reservoir.clone();
        }
        profile
    }
}

/// Mutable schedule shared by every caller of one limiter
#[derive(Debug)]
struct Schedule {
    /// Earliest start of the next call
    next_start: Instant,
    /// Remaining reservoir tokens, when a reservoir is configured
    tokens: Option<u32>,
    /// Last reservoir refill
    last_refill: Instant,
}

enum Admission {
    /// Start after this delay; slot and token are already taken
    StartAfter(Duration),
    /// Reservoir empty; look again after this delay
    RetryAfter(Duration),
}

/// Admission control for one (provider, credential) pair
#[derive(Debug)]
pub struct RateLimiter {
    profile: LimiterProfile,
    slots: Arc<Semaphore>,
    schedule: tokio::sync::Mutex<Schedule>,
}

/// Held for the duration of one provider call
#[derive(Debug)]
pub struct RatePermit {
    _slot: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(profile: LimiterProfile) -> Self {
        let now = Instant::now();
        let tokens = profile.reservoir.as_ref().map(|r| r.capacity);

        Self {
            slots: Arc::new(Semaphore::new(profile.max_concurrent.max(1))),
            schedule: tokio::sync::Mutex::new(Schedule {
                next_start: now,
                tokens,
                last_refill: now,
            }),
            profile,
        }
    }

    pub fn profile(&self) -> &LimiterProfile {
        &self.profile
    }

    /// Slots not currently held
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a slot, the spacing window and a reservoir token
    pub async fn acquire(&self) -> Result<RatePermit, ProviderError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::RateLimitExceeded("Rate limiter closed".to_string()))?;

        loop {
            match self.admit().await {
                Admission::StartAfter(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    return Ok(RatePermit { _slot: slot });
                }
                Admission::RetryAfter(delay) => {
                    debug!("Reservoir empty, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn admit(&self) -> Admission {
        let mut schedule = self.schedule.lock().await;
        let now = Instant::now();

        if let Some(reservoir) = &self.profile.reservoir {
            let interval = Duration::from_millis(reservoir.refill_interval_ms.max(1));
            let elapsed = now.saturating_duration_since(schedule.last_refill);
            if elapsed >= interval {
                let periods = (elapsed.as_millis() / interval.as_millis()) as u32;
                schedule.last_refill += interval * periods;
                schedule.tokens = Some(reservoir.refill_amount);
            }

            if schedule.tokens == Some(0) {
                let next_refill = schedule.last_refill + interval;
                return Admission::RetryAfter(next_refill.saturating_duration_since(now));
            }
        }

        let start = schedule.next_start.max(now);
        schedule.next_start = start + self.profile.min_spacing;
        if let Some(tokens) = schedule.tokens.as_mut() {
            *tokens -= 1;
        }

        Admission::StartAfter(start.saturating_duration_since(now))
    }
}

/// Process-wide limiter registry keyed by provider and credential
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: Mutex<HashMap<(ProviderKind, String), Arc<RateLimiter>>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared limiter for this provider config; the first caller's overrides win
    pub fn limiter_for(&self, config: &ProviderConfig) -> Arc<RateLimiter> {
        let key = (config.provider_type, hex_digest(config.api_key.as_bytes()));
        let mut limiters = self.limiters.lock();

        let limiter = limiters.entry(key).or_insert_with(|| {
            let profile = LimiterProfile::for_config(config);
            debug!(
                "Creating {} limiter: {} concurrent, {:?} spacing",
                config.provider_type.display_name(),
                profile.max_concurrent,
                profile.min_spacing
            );
            Arc::new(RateLimiter::new(profile))
        });

        Arc::clone(limiter)
    }

    /// Number of distinct limiters created
    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
