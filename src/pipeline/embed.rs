//! Embedding backfill over the metadata store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::Instrument;

use super::open_store;
use crate::config::IngestConfig;
use crate::db::Store;
use crate::embedding::{Embedder, Embedding, EmbeddingEngine};
use crate::error::{IngestError, Result};
use crate::extract::clean_text;
use crate::paper::types::safe_file_stem;
use crate::paper::{
    EmbedResult, EmbedStatus, EmbeddingBackend, EmbeddingRecord, PaperMetadata, Stage, StageStatus,
};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Consider at most this many papers.
    pub limit: Option<usize>,
    /// Papers per batch; `None` processes everything as one batch.
    pub batch_size: Option<usize>,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Recompute vectors that already exist.
    pub force: bool,
    /// List what would be embedded without computing or writing anything.
    pub dry_run: bool,
}

/// JSON document written to the vector sink.
#[derive(Serialize)]
struct VectorFile<'a> {
    arxiv_id: &'a str,
    backend: EmbeddingBackend,
    model: &'a str,
    dims: usize,
    vector: &'a [f32],
}

/// Build the engine for `backend`/`model` from config, then backfill.
///
/// The engine is constructed first so a missing credential or model fails
/// before the store is opened.
pub async fn embed_backfill(
    config: &IngestConfig,
    db_path: &Path,
    backend: EmbeddingBackend,
    model: Option<&str>,
    vector_dir: Option<&Path>,
    options: &EmbedOptions,
) -> Result<Vec<EmbedResult>> {
    let engine = EmbeddingEngine::new(
        backend,
        model,
        &config.embedding,
        RetryPolicy::from_config(&config.download),
    )?;
    embed_missing(db_path, &engine, vector_dir, options).await
}

/// Embed every paper with text but no vector for the embedder's
/// `(backend, model)`. With `force`, every paper with text is recomputed.
///
/// Per-paper problems (missing text, dimension mismatch, backend errors) are
/// attached to results. Configuration errors abort the pass.
pub async fn embed_missing(
    db_path: &Path,
    embedder: &dyn Embedder,
    vector_dir: Option<&Path>,
    options: &EmbedOptions,
) -> Result<Vec<EmbedResult>> {
    let Some(store) = open_store(Some(db_path), options.dry_run).await? else {
        return Ok(Vec::new());
    };

    let backend = embedder.backend();
    let model = embedder.model().to_string();
    let run_id = uuid::Uuid::now_v7().to_string();
    let span = tracing::info_span!("embed", run_id = %run_id, backend = %backend, model = %model);

    async {
        let candidates = if options.force {
            store.list_papers_with_text(options.limit).await?
        } else {
            store
                .list_papers_missing_embedding(backend, &model, options.limit)
                .await?
        };
        tracing::info!(
            papers = candidates.len(),
            db = %store.path().display(),
            force = options.force,
            dry_run = options.dry_run,
            "embedding pass"
        );

        let batch_size = options.batch_size.filter(|&n| n > 0).unwrap_or(candidates.len().max(1));
        let mut results = Vec::with_capacity(candidates.len());

        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            if index > 0 && !options.batch_delay.is_zero() {
                tokio::time::sleep(options.batch_delay).await;
            }

            for paper in batch {
                if options.dry_run {
                    results.push(EmbedResult {
                        arxiv_id: paper.arxiv_id.clone(),
                        backend,
                        model: model.clone(),
                        dims: None,
                        vector_path: None,
                        status: EmbedStatus::Planned,
                        error: None,
                    });
                    continue;
                }

                let mut result =
                    embed_loaded(&store, embedder, paper, vector_dir, Some(run_id.as_str())).await;
                if result.error.as_ref().is_some_and(IngestError::aborts_batch) {
                    if let Some(err) = result.error.take() {
                        tracing::error!(
                            arxiv_id = %paper.arxiv_id,
                            error = %err,
                            "aborting embedding pass"
                        );
                        return Err(err);
                    }
                }
                results.push(result);
            }
        }

        let embedded = results.iter().filter(|r| r.status == EmbedStatus::Embedded).count();
        let skipped = results.iter().filter(|r| r.status == EmbedStatus::Skipped).count();
        let failed = results.iter().filter(|r| r.status == EmbedStatus::Failed).count();
        tracing::info!(embedded, skipped, failed, "embedding pass finished");
        Ok::<_, IngestError>(results)
    }
    .instrument(span)
    .await
}

/// Embed a single stored paper, overwriting any existing vector for the
/// embedder's `(backend, model)`.
pub async fn embed_paper(
    store: &Store,
    embedder: &dyn Embedder,
    arxiv_id: &str,
    vector_dir: Option<&Path>,
) -> Result<EmbedResult> {
    let paper = store
        .get_paper(arxiv_id)
        .await?
        .ok_or_else(|| IngestError::NotFound(arxiv_id.to_string()))?;
    Ok(embed_loaded(store, embedder, &paper, vector_dir, None).await)
}

async fn embed_loaded(
    store: &Store,
    embedder: &dyn Embedder,
    paper: &PaperMetadata,
    vector_dir: Option<&Path>,
    run_id: Option<&str>,
) -> EmbedResult {
    let mut result = EmbedResult {
        arxiv_id: paper.arxiv_id.clone(),
        backend: embedder.backend(),
        model: embedder.model().to_string(),
        dims: None,
        vector_path: None,
        status: EmbedStatus::Embedded,
        error: None,
    };

    let text = match load_text(paper).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                arxiv_id = %paper.arxiv_id,
                error = %e,
                "skipping paper without usable text"
            );
            result.status = EmbedStatus::Skipped;
            result.error = Some(e);
            return result;
        }
    };

    record(store, &paper.arxiv_id, run_id, StageStatus::Pending, None).await;

    match compute_and_store(store, embedder, paper, &text, vector_dir).await {
        Ok((embedding, vector_path)) => {
            record(store, &paper.arxiv_id, run_id, StageStatus::Success, None).await;
            tracing::debug!(arxiv_id = %paper.arxiv_id, dims = embedding.dims, "embedded");
            result.dims = Some(embedding.dims);
            result.vector_path = vector_path;
        }
        Err(e) => {
            tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "embedding failed");
            record(store, &paper.arxiv_id, run_id, StageStatus::Error, Some(&e)).await;
            result.status = EmbedStatus::Failed;
            result.error = Some(e);
        }
    }
    result
}

async fn compute_and_store(
    store: &Store,
    embedder: &dyn Embedder,
    paper: &PaperMetadata,
    text: &str,
    vector_dir: Option<&Path>,
) -> Result<(Embedding, Option<PathBuf>)> {
    let embedding = embedder.embed(text).await?;
    if embedding.vector.is_empty() || embedding.dims != embedding.vector.len() {
        return Err(IngestError::Embedding(format!(
            "backend reported {} dims for a vector of length {}",
            embedding.dims,
            embedding.vector.len()
        )));
    }

    let record = EmbeddingRecord::new(
        paper.arxiv_id.clone(),
        embedder.backend(),
        embedder.model(),
        embedding.vector.clone(),
    );
    store.upsert_embedding(record).await?;

    let vector_path = match vector_dir {
        Some(dir) => Some(write_vector_file(dir, embedder, &paper.arxiv_id, &embedding).await?),
        None => None,
    };
    Ok((embedding, vector_path))
}

/// Read and clean the paper's text file.
async fn load_text(paper: &PaperMetadata) -> Result<String> {
    let missing = |reason: String| IngestError::MissingText {
        arxiv_id: paper.arxiv_id.clone(),
        reason,
    };

    let path = paper
        .text_path
        .as_deref()
        .ok_or_else(|| missing("no text path recorded".into()))?;
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| missing(format!("{}: {e}", path.display())))?;
    let text = clean_text(&raw);
    if text.is_empty() {
        return Err(missing(format!("{} is empty", path.display())));
    }
    Ok(text)
}

/// `<vector_dir>/<backend>/<model>/<safe_id>.json`
pub fn vector_file_path(
    vector_dir: &Path,
    backend: EmbeddingBackend,
    model: &str,
    arxiv_id: &str,
) -> PathBuf {
    vector_dir
        .join(backend.as_str())
        .join(safe_file_stem(model))
        .join(format!("{}.json", safe_file_stem(arxiv_id)))
}

async fn write_vector_file(
    vector_dir: &Path,
    embedder: &dyn Embedder,
    arxiv_id: &str,
    embedding: &Embedding,
) -> Result<PathBuf> {
    let path = vector_file_path(vector_dir, embedder.backend(), embedder.model(), arxiv_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec(&VectorFile {
        arxiv_id,
        backend: embedder.backend(),
        model: embedder.model(),
        dims: embedding.dims,
        vector: &embedding.vector,
    })?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

async fn record(
    store: &Store,
    paper_id: &str,
    run_id: Option<&str>,
    status: StageStatus,
    error: Option<&IngestError>,
) {
    let message = error.map(|e| e.to_string());
    if let Err(e) = store
        .record_stage(paper_id, run_id, Stage::Embed, status, message.as_deref())
        .await
    {
        tracing::warn!(arxiv_id = paper_id, error = %e, "failed to record processing event");
    }
}
