//! OpenAI-compatible embeddings API client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Embedder, Embedding};
use crate::config::EmbeddingConfig;
use crate::error::{IngestError, Result};
use crate::paper::EmbeddingBackend;
use crate::retry::RetryPolicy;

pub struct RemoteEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_input_chars: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    /// Requires `config.api_key` (which the config layer fills from
    /// `OPENAI_API_KEY`).
    pub fn new(config: &EmbeddingConfig, model: String, retry: RetryPolicy) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                IngestError::Config(
                    "remote embeddings need an API key: set embedding.api_key or OPENAI_API_KEY".into(),
                )
            })?;

        let client = Client::builder()
            .timeout(retry.attempt_timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model,
            max_input_chars: config.max_input_chars,
            retry,
        })
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| IngestError::Retryable(format!("embeddings request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Embedding(format!("failed to parse response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| IngestError::Embedding("empty embeddings response".into()))
    }
}

fn classify_status(status: StatusCode, body: &str) -> IngestError {
    let detail = format!("embeddings API returned {status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IngestError::Config(detail),
        StatusCode::TOO_MANY_REQUESTS => IngestError::Retryable(detail),
        s if s.is_server_error() => IngestError::Retryable(detail),
        _ => IngestError::Embedding(detail),
    }
}

/// Longest prefix of at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn backend(&self) -> EmbeddingBackend {
        EmbeddingBackend::RemoteApi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let input = truncate_chars(text, self.max_input_chars);
        let vector = self.retry.run("embeddings", || self.request(input)).await?;
        Ok(Embedding::new(vector))
    }
}
