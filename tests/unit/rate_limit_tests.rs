/*!
 * Tests for the limiter registry as the workers use it
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use subflow::app_config::{ProviderConfig, ProviderKind, ReservoirConfig};
use subflow::pipeline::{LimiterProfile, LimiterRegistry};

fn provider(kind: ProviderKind, api_key: &str) -> ProviderConfig {
    ProviderConfig::new(kind).with_api_key(api_key)
}

#[test]
fn test_limiterFor_shouldKeyOnProviderAndCredential() {
    let registry = LimiterRegistry::new();

    let a = registry.limiter_for(&provider(ProviderKind::OpenAI, "key-a"));
    let a_again = registry.limiter_for(&provider(ProviderKind::OpenAI, "key-a"));
    let b = registry.limiter_for(&provider(ProviderKind::OpenAI, "key-b"));
    let gemini = registry.limiter_for(&provider(ProviderKind::Gemini, "key-a"));

    assert!(Arc::ptr_eq(&a, &a_again));
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &gemini));
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_limiterFor_shouldKeepFirstOverrides() {
    let registry = LimiterRegistry::new();
    let mut first = provider(ProviderKind::DeepL, "k");
    first.max_concurrent = Some(2);
    let mut second = provider(ProviderKind::DeepL, "k");
    second.max_concurrent = Some(9);

    registry.limiter_for(&first);
    let limiter = registry.limiter_for(&second);

    assert_eq!(limiter.profile().max_concurrent, 2);
}

#[test]
fn test_forProvider_shouldGiveGeminiAReservoir() {
    let gemini = LimiterProfile::for_provider(ProviderKind::Gemini);
    let openai = LimiterProfile::for_provider(ProviderKind::OpenAI);

    assert!(gemini.reservoir.is_some());
    assert!(openai.reservoir.is_none());
    assert!(gemini.max_concurrent > openai.max_concurrent);
}

#[tokio::test]
async fn test_permit_shouldReleaseSlotWhenDropped() {
    let registry = LimiterRegistry::new();
    let mut config = provider(ProviderKind::OpenAI, "k");
    config.max_concurrent = Some(1);
    config.min_spacing_ms = Some(0);
    let limiter = registry.limiter_for(&config);

    let permit = limiter.acquire().await.unwrap();
    assert_eq!(limiter.available_slots(), 0);

    let waiter = {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move { limiter.acquire().await.map(|_| Instant::now()) })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    drop(permit);
    let admitted = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(admitted.is_ok());
    assert_eq!(limiter.available_slots(), 1);
}

#[tokio::test]
async fn test_acquire_withReservoirOverride_shouldThrottleBeyondCapacity() {
    let registry = LimiterRegistry::new();
    let mut config = provider(ProviderKind::Groq, "k");
    config.min_spacing_ms = Some(0);
    config.reservoir = Some(ReservoirConfig {
        capacity: 2,
        refill_amount: 2,
        refill_interval_ms: 150,
    });
    let limiter = registry.limiter_for(&config);

    let started = Instant::now();
    for _ in 0..3 {
        drop(limiter.acquire().await.unwrap());
    }

    assert!(started.elapsed() >= Duration::from_millis(100));
}
