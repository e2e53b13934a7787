//! Text-to-vector embedding.
//!
//! [`Embedder`] is the uniform capability the pipeline depends on.
//! [`EmbeddingEngine`] is the closed set of real backends: a hosted
//! OpenAI-compatible API ([`remote::RemoteEmbedder`]) and an in-process ONNX
//! model ([`local::LocalEmbeddingProvider`]). Construction validates
//! credentials and model files so configuration problems surface before any
//! paper is touched.

pub mod local;
pub mod remote;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use crate::paper::EmbeddingBackend;
use crate::retry::RetryPolicy;

pub use local::LocalEmbeddingProvider;
pub use remote::RemoteEmbedder;

/// A computed vector and its dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dims: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dims = vector.len();
        Self { vector, dims }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn backend(&self) -> EmbeddingBackend;

    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding>;
}

pub enum EmbeddingEngine {
    Remote(RemoteEmbedder),
    Local(LocalEmbeddingProvider),
}

impl EmbeddingEngine {
    /// Build the engine for `backend`, using the backend's default model when
    /// `model` is `None`.
    ///
    /// Fails with [`crate::error::IngestError::Config`] when the API key or the
    /// local model files are missing.
    pub fn new(
        backend: EmbeddingBackend,
        model: Option<&str>,
        config: &EmbeddingConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let model = model
            .map(str::to_string)
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| backend.default_model().to_string());

        let engine = match backend {
            EmbeddingBackend::RemoteApi => Self::Remote(RemoteEmbedder::new(config, model, retry)?),
            EmbeddingBackend::LocalModel => {
                Self::Local(LocalEmbeddingProvider::new(config, model)?)
            }
        };
        tracing::info!(
            backend = %engine.backend(),
            model = engine.model(),
            "embedding engine ready"
        );
        Ok(engine)
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    fn backend(&self) -> EmbeddingBackend {
        match self {
            Self::Remote(e) => e.backend(),
            Self::Local(e) => e.backend(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Remote(e) => e.model(),
            Self::Local(e) => e.model(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        match self {
            Self::Remote(e) => e.embed(text).await,
            Self::Local(e) => e.embed(text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;

    #[test]
    fn remote_without_key_fails_fast() {
        let config = EmbeddingConfig::default();
        let result = EmbeddingEngine::new(
            EmbeddingBackend::RemoteApi,
            None,
            &config,
            RetryPolicy::immediate(1),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn local_without_model_files_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            cache_dir: dir.path().to_string_lossy().into_owned(),
            ..EmbeddingConfig::default()
        };
        let result = EmbeddingEngine::new(
            EmbeddingBackend::LocalModel,
            None,
            &config,
            RetryPolicy::immediate(1),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn remote_uses_default_model() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            ..EmbeddingConfig::default()
        };
        let engine = EmbeddingEngine::new(
            EmbeddingBackend::RemoteApi,
            None,
            &config,
            RetryPolicy::immediate(1),
        )
        .unwrap();
        assert_eq!(engine.model(), "text-embedding-3-small");
        assert_eq!(engine.backend(), EmbeddingBackend::RemoteApi);
    }

    #[test]
    fn explicit_model_wins_over_config() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            model: Some("text-embedding-3-large".into()),
            ..EmbeddingConfig::default()
        };
        let engine = EmbeddingEngine::new(
            EmbeddingBackend::RemoteApi,
            Some("custom-model"),
            &config,
            RetryPolicy::immediate(1),
        )
        .unwrap();
        assert_eq!(engine.model(), "custom-model");
    }
}
