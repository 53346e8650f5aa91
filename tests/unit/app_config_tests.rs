/*!
 * Tests for application configuration functionality
 */

use subflow::app_config::{Config, LogLevel, ProviderConfig, ProviderKind, ReservoirConfig};
use tempfile::TempDir;

/// Test default configuration values
#[test]
fn test_defaultConfig_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.queue.orchestration_concurrency, 3);
    assert_eq!(config.queue.orchestration_attempts, 3);
    assert_eq!(config.queue.orchestration_backoff_ms, 2000);
    assert_eq!(config.queue.batch_concurrency, 20);
    assert_eq!(config.queue.batch_attempts, 3);
    assert_eq!(config.queue.batch_backoff_ms, 3000);

    assert_eq!(config.translation.common.max_attempts, 3);
    assert_eq!(config.translation.common.retry_backoff_ms, 1000);
    assert_eq!(config.resolver.min_confidence, 0.6);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.database_path.is_none());
}

/// Batch windows differ per provider
#[test]
fn test_effectiveBatchSize_shouldDependOnProvider() {
    assert_eq!(ProviderConfig::new(ProviderKind::OpenAI).effective_batch_size(), 50);
    assert_eq!(ProviderConfig::new(ProviderKind::Gemini).effective_batch_size(), 60);
    assert_eq!(ProviderConfig::new(ProviderKind::DeepL).effective_batch_size(), 60);

    let mut custom = ProviderConfig::new(ProviderKind::Groq);
    custom.batch_size = 0;
    assert_eq!(custom.effective_batch_size(), 60);
}

/// Test configuration validation
#[test]
fn test_validate_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.queue.batch_concurrency = 0;
    assert!(config.validate().is_err());
    config.queue.batch_concurrency = 20;

    config.resolver.min_confidence = 1.5;
    assert!(config.validate().is_err());
    config.resolver.min_confidence = 0.6;

    config.translation.available_providers.push(ProviderConfig::new(ProviderKind::Custom));
    assert!(config.validate().is_err(), "custom provider without endpoint");
    if let Some(custom) = config.translation.available_providers.last_mut() {
        custom.endpoint = "http://localhost:1234/v1".to_string();
    }
    assert!(config.validate().is_ok());

    let mut gemini = ProviderConfig::new(ProviderKind::Gemini);
    gemini.reservoir = Some(ReservoirConfig {
        capacity: 10,
        refill_amount: 0,
        refill_interval_ms: 1000,
    });
    config.translation.available_providers.push(gemini);
    assert!(config.validate().is_err(), "reservoir that never refills");
}

/// Provider resolution falls back to defaults for unconfigured kinds
#[test]
fn test_resolveProvider_shouldPreferConfiguredEntry() {
    let mut config = Config::default();
    config.translation.available_providers.clear();

    let mut openai = ProviderConfig::new(ProviderKind::OpenAI).with_api_key("sk-test");
    openai.batch_size = 25;
    config.translation.available_providers.push(openai);

    let resolved = config.translation.resolve_provider(None);
    assert_eq!(resolved.batch_size, 25);
    assert_eq!(resolved.api_key, "sk-test");

    let deepl = config.translation.resolve_provider(Some(ProviderKind::DeepL));
    assert_eq!(deepl.provider_type, ProviderKind::DeepL);
    assert!(deepl.api_key.is_empty());
}

/// Missing files are created with defaults, present ones are read back
#[test]
fn test_loadOrCreate_shouldWriteDefaultsThenReadThem() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.queue.batch_concurrency, created.queue.batch_concurrency);
    assert_eq!(loaded.translation.provider, created.translation.provider);
}

/// Partial JSON falls back to field defaults
#[test]
fn test_deserialize_withPartialJson_shouldFillDefaults() {
    let json = r#"{
        "log_level": "debug",
        "translation": {
            "provider": "deepl",
            "available_providers": [
                { "type": "deepl", "api_key": "key:fx", "min_spacing_ms": 250 }
            ]
        }
    }"#;

    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.translation.provider, ProviderKind::DeepL);
    let deepl = &config.translation.available_providers[0];
    assert_eq!(deepl.min_spacing_ms, Some(250));
    assert_eq!(deepl.timeout_secs, 60);
    assert_eq!(config.queue.batch_attempts, 3);
    assert_eq!(log::LevelFilter::Debug, config.log_level.to_level_filter());
}
