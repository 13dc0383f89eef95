//! Translation relay: the pluggable step that localizes each delivery.

mod cache;
pub mod deepl;
mod openai;
mod prompt;
mod sse_parser;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ProviderKind, TranslationSettings};
use crate::error::RelayError;
use crate::protocol::Language;

pub use cache::CachedTranslator;
pub use deepl::DeepLTranslator;
pub use openai::OpenAiTranslator;

/// Translates text into a target language.
///
/// Failures are reported as [`RelayError::TranslationUnavailable`]; callers
/// treat them as recoverable.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: Language) -> Result<String, RelayError>;

    /// Stable identity of the provider, used in cache keys and logs.
    fn name(&self) -> &str;
}

/// Returns text unchanged. Used when no provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _target: Language) -> Result<String, RelayError> {
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Builds the translator described by resolved configuration, wrapped in
/// the cache when caching is enabled.
pub fn build_translator(settings: &TranslationSettings) -> Result<Arc<dyn Translator>> {
    let Some(provider) = &settings.provider else {
        tracing::warn!("no translation provider configured; messages will be relayed untranslated");
        return Ok(Arc::new(PassthroughTranslator));
    };

    let translator: Arc<dyn Translator> = match provider.kind {
        ProviderKind::OpenAi => {
            let model = provider.model.clone().ok_or_else(|| {
                anyhow::anyhow!("Provider '{}' requires a model", provider.name)
            })?;
            Arc::new(OpenAiTranslator::new(
                provider.endpoint.clone(),
                provider.api_key.clone(),
                model,
                settings.timeout,
            )?)
        }
        ProviderKind::DeepL => {
            let auth_key = provider.api_key.clone().ok_or_else(|| {
                anyhow::anyhow!("Provider '{}' requires an API key", provider.name)
            })?;
            Arc::new(DeepLTranslator::new(
                provider.endpoint.clone(),
                auth_key,
                settings.timeout,
            )?)
        }
    };

    tracing::info!(
        provider = %provider.name,
        backend = translator.name(),
        cache_entries = settings.cache_entries,
        "translation provider ready"
    );

    if settings.cache_entries == 0 {
        Ok(translator)
    } else {
        Ok(Arc::new(CachedTranslator::new(
            translator,
            settings.cache_entries,
        )))
    }
}
