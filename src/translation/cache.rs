//! In-memory translation cache.
//!
//! Broadcasts translate the same text once per recipient; recipients that
//! share a language hit the cache instead of the provider.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use super::Translator;
use crate::error::RelayError;
use crate::protocol::Language;

#[derive(Default)]
struct Entries {
    map: HashMap<String, String>,
    // Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Wraps a translator with a bounded cache of successful translations.
pub struct CachedTranslator {
    inner: Arc<dyn Translator>,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl CachedTranslator {
    pub fn new(inner: Arc<dyn Translator>, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Compute cache key for a translation
    pub fn cache_key(&self, text: &str, target: Language) -> String {
        let cache_input = serde_json::json!({
            "source_text": text,
            "target_language": target.code(),
            "provider": self.inner.name(),
        });

        let mut hasher = Sha256::new();
        hasher.update(cache_input.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.lock().map.get(key).cloned()
    }

    fn put(&self, key: String, translated: String) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        if entries.map.contains_key(&key) {
            return;
        }
        while entries.map.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.map.remove(&oldest);
        }
        entries.order.push_back(key.clone());
        entries.map.insert(key, translated);
    }
}

#[async_trait]
impl Translator for CachedTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String, RelayError> {
        let key = self.cache_key(text, target);
        if let Some(hit) = self.get(&key) {
            tracing::trace!(target_language = %target, "translation cache hit");
            return Ok(hit);
        }

        let translated = self.inner.translate(text, target).await?;
        self.put(key, translated.clone());
        Ok(translated)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
