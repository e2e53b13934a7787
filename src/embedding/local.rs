//! Local ONNX Runtime embedding provider.
//!
//! Runs a sentence-transformers style ONNX export via `ort`: tokenization,
//! inference, attention-masked mean pooling, and L2 normalization. Model files
//! live at `<cache_dir>/<model>/{model.onnx,tokenizer.json}`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{Embedder, Embedding};
use crate::config::EmbeddingConfig;
use crate::error::{IngestError, Result};
use crate::paper::EmbeddingBackend;

/// Maximum sequence length fed to the model (MiniLM was trained at 256).
const MAX_SEQ_LEN: usize = 256;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Directory holding the files for `model` under the configured cache.
pub fn model_dir(config: &EmbeddingConfig, model: &str) -> PathBuf {
    crate::config::expand_tilde(&config.cache_dir).join(model)
}

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

pub struct LocalEmbeddingProvider {
    model: String,
    runtime: Arc<OnnxModel>,
}

impl LocalEmbeddingProvider {
    /// Load the model. Missing files and load failures are configuration errors.
    pub fn new(config: &EmbeddingConfig, model: String) -> Result<Self> {
        let dir = model_dir(config, &model);
        let model_path = dir.join(MODEL_FILE);
        let tokenizer_path = dir.join(TOKENIZER_FILE);

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(IngestError::Config(format!(
                    "model file not found at {}. Run `arxiv-ingest model download --model {model}` first.",
                    path.display()
                )));
            }
        }

        let runtime = OnnxModel::load(&model_path, &tokenizer_path)
            .map_err(|e| {
                IngestError::Config(format!("failed to load local model {model}: {e:#}"))
            })?;

        Ok(Self {
            model,
            runtime: Arc::new(runtime),
        })
    }
}

impl OnnxModel {
    fn load(model_path: &Path, tokenizer_path: &Path) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids_flat = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask_flat = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            input_ids_flat.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_flat.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids_flat.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask_flat.clone().into_boxed_slice()))?;
        // token_type_ids: all zeros (single segment)
        let token_type_ids = vec![0i64; batch_size * seq_len];
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        })?;

        // Output name varies by export.
        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings tensor")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] > 0,
            "unexpected token embeddings shape: {dims:?}, expected [batch, seq, hidden]"
        );
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        let mut results = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;

            for s in 0..actual_seq_len {
                let mask = attention_mask_flat[b * seq_len + s] as f32;
                if mask > 0.0 {
                    let offset = (b * actual_seq_len + s) * hidden_dim;
                    for d in 0..hidden_dim {
                        sum[d] += data[offset + d] * mask;
                    }
                    count += mask;
                }
            }

            if count > 0.0 {
                for value in sum.iter_mut() {
                    *value /= count;
                }
            }

            results.push(l2_normalize(&sum));
        }

        Ok(results)
    }
}

#[async_trait]
impl Embedder for LocalEmbeddingProvider {
    fn backend(&self) -> EmbeddingBackend {
        EmbeddingBackend::LocalModel
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let runtime = Arc::clone(&self.runtime);
        let text = text.to_string();
        let vectors = tokio::task::spawn_blocking(move || runtime.embed_batch(&[text.as_str()]))
            .await?
            .map_err(|e| IngestError::Embedding(format!("{e:#}")))?;

        vectors
            .into_iter()
            .next()
            .map(Embedding::new)
            .ok_or_else(|| IngestError::Embedding("model returned no vector".into()))
    }
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn model_dir_is_namespaced_by_model() {
        let config = EmbeddingConfig {
            cache_dir: "/var/cache/arxiv".into(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(
            model_dir(&config, "all-MiniLM-L6-v2"),
            PathBuf::from("/var/cache/arxiv/all-MiniLM-L6-v2")
        );
    }

    #[test]
    fn missing_tokenizer_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("m");
        std::fs::create_dir_all(&model_path).unwrap();
        std::fs::write(model_path.join(MODEL_FILE), b"onnx").unwrap();
        let config = EmbeddingConfig {
            cache_dir: dir.path().to_string_lossy().into_owned(),
            ..EmbeddingConfig::default()
        };

        let err = match LocalEmbeddingProvider::new(&config, "m".into()) {
            Err(e) => e,
            Ok(_) => panic!("expected a config error"),
        };
        assert!(matches!(err, IngestError::Config(ref msg) if msg.contains(TOKENIZER_FILE)));
    }

    fn installed_provider() -> LocalEmbeddingProvider {
        let config = EmbeddingConfig::default();
        LocalEmbeddingProvider::new(&config, "all-MiniLM-L6-v2".into()).unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires model files: run `arxiv-ingest model download` first
    async fn test_embed_produces_model_dims() {
        let provider = installed_provider();
        let embedding = provider.embed("Quantum error correction codes").await.unwrap();
        assert_eq!(embedding.dims, 384);
        assert_eq!(embedding.vector.len(), embedding.dims);
    }

    #[tokio::test]
    #[ignore]
    async fn test_embed_is_l2_normalized_and_deterministic() {
        let provider = installed_provider();
        let a = provider.embed("Topological qubits").await.unwrap();
        let b = provider.embed("Topological qubits").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "L2 norm should be ~1.0, got {norm}");
    }
}
