use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles loading, validating and saving the pipeline settings:
/// storage locations, work queue sizing, translation providers and the
/// subtitle source.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// SQLite database file; the user data directory is used when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Directory below which subtitle artifacts are written
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,

    /// Work queue sizing and retry settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Source subtitle lookup
    #[serde(default)]
    pub source: SourceConfig,

    /// Content identity resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    // @provider: OpenAI chat completions
    #[default]
    OpenAI,
    // @provider: Google Gemini through its OpenAI-compatible endpoint
    Gemini,
    // @provider: OpenRouter
    OpenRouter,
    // @provider: Groq
    Groq,
    // @provider: Together AI
    TogetherAI,
    // @provider: Any OpenAI-compatible server (endpoint required)
    Custom,
    // @provider: DeepL (text and document translation)
    DeepL,
}

impl ProviderKind {
    /// Every supported kind, in display order
    pub const ALL: [ProviderKind; 7] = [
        Self::OpenAI,
        Self::Gemini,
        Self::OpenRouter,
        Self::Groq,
        Self::TogetherAI,
        Self::Custom,
        Self::DeepL,
    ];

    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Gemini => "Google Gemini",
            Self::OpenRouter => "OpenRouter",
            Self::Groq => "Groq",
            Self::TogetherAI => "Together AI",
            Self::Custom => "Custom",
            Self::DeepL => "DeepL",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::Gemini => "gemini".to_string(),
            Self::OpenRouter => "openrouter".to_string(),
            Self::Groq => "groq".to_string(),
            Self::TogetherAI => "togetherai".to_string(),
            Self::Custom => "custom".to_string(),
            Self::DeepL => "deepl".to_string(),
        }
    }

    /// Whether the provider speaks the OpenAI chat completions protocol
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(self, Self::DeepL)
    }

    /// Whether a key is required to call the provider
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// Cues per batch when the provider config does not say otherwise
    pub fn default_batch_size(&self) -> usize {
        match self {
            Self::OpenAI => 50,
            _ => 60,
        }
    }

    /// Base URL used when the provider config leaves `endpoint` empty
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::TogetherAI => "https://api.together.xyz/v1",
            Self::Custom => "",
            Self::DeepL => "https://api.deepl.com/v2",
        }
    }

    /// Model used when the provider config leaves `model` empty
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Gemini => "gemini-2.0-flash",
            Self::OpenRouter => "openai/gpt-4o-mini",
            Self::Groq => "llama-3.3-70b-versatile",
            Self::TogetherAI => "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            Self::Custom => "",
            Self::DeepL => "",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "openai" | "chatgptapi" => Ok(Self::OpenAI),
            "gemini" | "googlegemini" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            "groq" => Ok(Self::Groq),
            "togetherai" | "together" => Ok(Self::TogetherAI),
            "custom" => Ok(Self::Custom),
            "deepl" => Ok(Self::DeepL),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Token reservoir refilled on a fixed interval
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReservoirConfig {
    /// Tokens available at start
    pub capacity: u32,
    /// Value the reservoir is reset to on every refill
    pub refill_amount: u32,
    /// Refill period in milliseconds
    pub refill_interval_ms: u64,
}

/// Provider configuration; also travels inside queued tasks
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: ProviderKind,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Cues per batch (0 = provider default)
    #[serde(default)]
    pub batch_size: usize,

    // @field: Timeout seconds per provider call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Limiter override, concurrent calls
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    // @field: Limiter override, spacing between call starts
    #[serde(default)]
    pub min_spacing_ms: Option<u64>,

    // @field: Limiter override, token reservoir
    #[serde(default)]
    pub reservoir: Option<ReservoirConfig>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: ProviderKind) -> Self {
        Self {
            provider_type,
            model: provider_type.default_model().to_string(),
            api_key: String::new(),
            endpoint: provider_type.default_endpoint().to_string(),
            batch_size: provider_type.default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: None,
            min_spacing_ms: None,
            reservoir: None,
        }
    }

    /// Builder-style API key setter
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Effective batch size
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size > 0 {
            self.batch_size
        } else {
            self.provider_type.default_batch_size()
        }
    }

    /// Effective endpoint without a trailing slash
    pub fn effective_endpoint(&self) -> String {
        let endpoint = if self.endpoint.is_empty() {
            self.provider_type.default_endpoint()
        } else {
            self.endpoint.as_str()
        };
        endpoint.trim_end_matches('/').to_string()
    }

    /// Effective model name
    pub fn effective_model(&self) -> String {
        if self.model.is_empty() {
            self.provider_type.default_model().to_string()
        } else {
            self.model.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        let name = self.provider_type.display_name();
        if self.provider_type == ProviderKind::Custom && self.endpoint.is_empty() {
            return Err(anyhow!("Provider {} requires an endpoint", name));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("Provider {} timeout must be greater than zero", name));
        }
        if self.max_concurrent == Some(0) {
            return Err(anyhow!("Provider {} max_concurrent must be greater than zero", name));
        }
        if let Some(reservoir) = &self.reservoir {
            if reservoir.refill_interval_ms == 0 || reservoir.refill_amount == 0 {
                return Err(anyhow!("Provider {} reservoir must refill", name));
            }
        }
        Ok(())
    }
}

/// Work queue sizing for the two task types
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    /// Orchestration tasks running at once
    #[serde(default = "default_orchestration_concurrency")]
    pub orchestration_concurrency: usize,

    /// Delivery attempts per orchestration task
    #[serde(default = "default_attempts")]
    pub orchestration_attempts: u32,

    /// Base of the exponential backoff between orchestration attempts
    #[serde(default = "default_orchestration_backoff_ms")]
    pub orchestration_backoff_ms: u64,

    /// Batch tasks running at once
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Delivery attempts per batch task
    #[serde(default = "default_attempts")]
    pub batch_attempts: u32,

    /// Base of the exponential backoff between batch attempts
    #[serde(default = "default_batch_backoff_ms")]
    pub batch_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            orchestration_concurrency: default_orchestration_concurrency(),
            orchestration_attempts: default_attempts(),
            orchestration_backoff_ms: default_orchestration_backoff_ms(),
            batch_concurrency: default_batch_concurrency(),
            batch_attempts: default_attempts(),
            batch_backoff_ms: default_batch_backoff_ms(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use when a request names none
    #[serde(default)]
    pub provider: ProviderKind,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Attempts per batch, recovery attempts included
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Source subtitle provider settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceConfig {
    /// OpenSubtitles v3 addon base URL
    #[serde(default = "default_opensubtitles_url")]
    pub opensubtitles_url: String,

    /// HTTP timeout for search and download
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            opensubtitles_url: default_opensubtitles_url(),
            timeout_secs: default_source_timeout_secs(),
        }
    }
}

/// Content identity resolution settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Resolutions below this confidence are routed to manual search
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("subtitles")
}

fn default_orchestration_concurrency() -> usize {
    3
}

fn default_batch_concurrency() -> usize {
    20
}

fn default_attempts() -> u32 {
    3
}

fn default_orchestration_backoff_ms() -> u64 {
    2000
}

fn default_batch_backoff_ms() -> u64 {
    3000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_backoff_ms() -> u64 {
    1000 // multiplied by the attempt number
}

fn default_temperature() -> f32 {
    0.3
}

fn default_opensubtitles_url() -> String {
    "https://opensubtitles-v3.strem.io/subtitles/".to_string()
}

fn default_source_timeout_secs() -> u64 {
    30
}

fn default_min_confidence() -> f32 {
    0.6
}

impl Config {
    /// Load a configuration file, writing the defaults first when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open config file: {:?}", path))?;
            let reader = std::io::BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            log::warn!("Config file not found at {:?}, creating default config.", path);
            let config = Config::default();
            let config_json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize default config to JSON")?;
            std::fs::write(path, config_json)
                .with_context(|| format!("Failed to write default config to file: {:?}", path))?;
            Ok(config)
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let queue = &self.queue;
        if queue.orchestration_concurrency == 0 || queue.batch_concurrency == 0 {
            return Err(anyhow!("Queue concurrency must be greater than zero"));
        }
        if queue.orchestration_attempts == 0 || queue.batch_attempts == 0 {
            return Err(anyhow!("Queue attempts must be greater than zero"));
        }
        if self.translation.common.max_attempts == 0 {
            return Err(anyhow!("Translation max_attempts must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.translation.common.temperature) {
            return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
        }
        if !(0.0..=1.0).contains(&self.resolver.min_confidence) {
            return Err(anyhow!("Resolver min_confidence must be between 0.0 and 1.0"));
        }
        url::Url::parse(&self.source.opensubtitles_url)
            .with_context(|| format!("Invalid OpenSubtitles URL: {}", self.source.opensubtitles_url))?;

        for provider in &self.translation.available_providers {
            provider.validate()?;
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: None,
            artifact_root: default_artifact_root(),
            queue: QueueConfig::default(),
            translation: TranslationConfig::default(),
            source: SourceConfig::default(),
            resolver: ResolverConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &ProviderKind) -> Option<&ProviderConfig> {
        self.available_providers
            .iter()
            .find(|p| &p.provider_type == provider_type)
    }

    /// Resolve the provider settings for a request, falling back to defaults
    pub fn resolve_provider(&self, provider_type: Option<ProviderKind>) -> ProviderConfig {
        let kind = provider_type.unwrap_or(self.provider);
        self.get_provider_config(&kind)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::new(kind))
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            available_providers: ProviderKind::ALL
                .iter()
                .filter(|kind| **kind != ProviderKind::Custom)
                .map(|kind| ProviderConfig::new(*kind))
                .collect(),
            common: TranslationCommonConfig::default(),
        }
    }
}
