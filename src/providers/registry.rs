/*!
 * Backend registry.
 *
 * Builds one backend per distinct provider configuration and hands out the
 * shared instance. Explicit registrations replace the built backend for a
 * provider kind, which is how tests and embedders plug in their own.
 */

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::deepl::DeepLBackend;
use super::openai::OpenAiCompatibleBackend;
use super::TranslationBackend;
use crate::app_config::{ProviderConfig, ProviderKind};
use crate::content::key::hex_digest;
use crate::errors::ProviderError;

/// Process-wide backend cache
#[derive(Debug)]
pub struct BackendRegistry {
    /// Sampling temperature passed to chat backends
    temperature: f32,
    /// Built backends keyed by kind, endpoint, model and key hash
    cache: Mutex<HashMap<String, Arc<dyn TranslationBackend>>>,
    /// Explicit registrations, checked first
    overrides: Mutex<HashMap<ProviderKind, Arc<dyn TranslationBackend>>>,
}

impl BackendRegistry {
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            cache: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `backend` for every request naming `kind`
    pub fn register(&self, kind: ProviderKind, backend: Arc<dyn TranslationBackend>) {
        self.overrides.lock().insert(kind, backend);
    }

    /// Backend for a provider configuration
    pub fn backend_for(&self, config: &ProviderConfig) -> Result<Arc<dyn TranslationBackend>, ProviderError> {
        if let Some(backend) = self.overrides.lock().get(&config.provider_type) {
            return Ok(Arc::clone(backend));
        }

        let kind = config.provider_type;
        if kind.requires_api_key() && config.api_key.trim().is_empty() {
            return Err(ProviderError::AuthenticationError(format!(
                "No API key configured for {}",
                kind.display_name()
            )));
        }

        let key = format!(
            "{}|{}|{}|{}",
            kind,
            config.effective_endpoint(),
            config.effective_model(),
            hex_digest(config.api_key.as_bytes())
        );

        let mut cache = self.cache.lock();
        let backend = cache.entry(key).or_insert_with(|| -> Arc<dyn TranslationBackend> {
            debug!("Creating {} backend", kind.display_name());
            if kind.is_openai_compatible() {
                Arc::new(OpenAiCompatibleBackend::new(config, self.temperature))
            } else {
                Arc::new(DeepLBackend::new(config))
            }
        });

        Ok(Arc::clone(backend))
    }
}
