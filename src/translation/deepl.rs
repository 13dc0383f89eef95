//! DeepL REST API translator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Translator;
use crate::error::RelayError;
use crate::protocol::Language;

/// DeepL's free-tier API host.
pub const DEFAULT_ENDPOINT: &str = "https://api-free.deepl.com";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    target_lang: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// DeepL target code for a language.
///
/// DeepL wants a regional variant for English and Portuguese targets.
pub const fn target_code(target: Language) -> &'static str {
    match target {
        Language::En => "EN-US",
        Language::Pt => "PT-PT",
        other => other.code(),
    }
}

pub struct DeepLTranslator {
    client: Client,
    endpoint: String,
    auth_key: String,
    name: String,
}

impl DeepLTranslator {
    pub fn new(endpoint: String, auth_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let name = format!("deepl:{endpoint}");

        Ok(Self {
            client,
            endpoint,
            auth_key,
            name,
        })
    }

    async fn request(&self, text: &str, target: Language) -> Result<String> {
        let url = format!("{}/v2/translate", self.endpoint.trim_end_matches('/'));
        let body = TranslateRequest {
            text: [text],
            target_lang: target_code(target),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.auth_key))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to connect to DeepL endpoint: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            // 456 is DeepL's "quota exceeded".
            if status.as_u16() == 456 {
                anyhow::bail!("DeepL character quota exceeded");
            }
            if status == StatusCode::FORBIDDEN {
                anyhow::bail!("DeepL rejected the auth key");
            }
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("DeepL request failed with status {status}: {body}");
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .context("Failed to parse DeepL response")?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .context("DeepL returned no translations")
    }
}

#[async_trait]
impl Translator for DeepLTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String, RelayError> {
        self.request(text, target)
            .await
            .map_err(|e| RelayError::TranslationUnavailable(format!("{e:#}")))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
