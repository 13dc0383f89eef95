use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use std::borrow::Cow;
use std::pin::Pin;
use std::time::Duration;

use super::Translator;
use super::prompt::build_system_prompt;
use super::sse_parser::sse_to_text_stream;
use crate::error::RelayError;
use crate::protocol::Language;

// Use Cow to avoid cloning strings that are only borrowed for serialization
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
    role: &'static str,
    content: Cow<'a, str>,
}

/// Translator backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiTranslator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    name: String,
}

impl OpenAiTranslator {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let name = format!("openai:{endpoint}:{model}");

        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            name,
        })
    }

    pub async fn translate_stream(
        &self,
        text: &str,
        target: Language,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String>> + Send>>> {
        let url = format!(
            "{}/v1/chat/completions",
            self.endpoint.trim_end_matches('/')
        );

        let chat_request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                PromptMessage {
                    role: "system",
                    content: Cow::Owned(build_system_prompt(target)),
                },
                PromptMessage {
                    role: "user",
                    content: Cow::Borrowed(text),
                },
            ],
            stream: true,
        };

        let mut http_request = self.client.post(&url).json(&chat_request);

        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request
            .send()
            .await
            .with_context(|| format!("Failed to connect to API endpoint: {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API request failed with status {status}: {body}");
        }

        Ok(Box::pin(sse_to_text_stream(response.bytes_stream())))
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String, RelayError> {
        let unavailable = |e: anyhow::Error| RelayError::TranslationUnavailable(format!("{e:#}"));

        let mut stream = self.translate_stream(text, target).await.map_err(unavailable)?;
        let mut translated = String::new();
        while let Some(chunk) = stream.next().await {
            translated.push_str(&chunk.map_err(unavailable)?);
        }

        let translated = translated.trim();
        if translated.is_empty() {
            return Err(RelayError::TranslationUnavailable(
                "provider returned an empty translation".to_string(),
            ));
        }
        Ok(translated.to_string())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
