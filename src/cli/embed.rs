//! CLI `embed` command: backfill embeddings for stored papers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use arxiv_ingest::config::IngestConfig;
use arxiv_ingest::paper::EmbedStatus;
use arxiv_ingest::pipeline::embed_backfill;
use arxiv_ingest::{EmbedOptions, EmbeddingBackend};

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// SQLite database holding ingested papers (defaults to storage.db_path)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// `remote` (OpenAI-compatible API) or `local` (ONNX model)
    #[arg(long)]
    pub backend: Option<String>,
    /// Model name (backend default when omitted)
    #[arg(long)]
    pub model: Option<String>,
    /// Also write each vector as JSON under this directory
    #[arg(long)]
    pub vector_dir: Option<PathBuf>,
    /// Embed at most this many papers
    #[arg(long)]
    pub limit: Option<usize>,
    /// Papers per batch
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Pause between batches, in milliseconds
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,
    /// Recompute vectors that already exist
    #[arg(long)]
    pub force: bool,
    /// List papers that would be embedded
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn embed(config: &IngestConfig, args: &EmbedArgs) -> Result<()> {
    let db_path = args
        .db
        .clone()
        .or_else(|| config.resolved_db_path())
        .context("no database given: pass --db or set storage.db_path")?;

    let backend_name = args.backend.as_deref().unwrap_or(&config.embedding.backend);
    let backend: EmbeddingBackend = backend_name.parse().map_err(anyhow::Error::msg)?;

    let options = EmbedOptions {
        limit: args.limit,
        batch_size: args.batch_size.or(config.embedding.batch_size),
        batch_delay: Duration::from_millis(
            args.batch_delay_ms
                .or(config.embedding.batch_delay_ms)
                .unwrap_or(0),
        ),
        force: args.force,
        dry_run: args.dry_run,
    };

    let results = embed_backfill(
        config,
        &db_path,
        backend,
        args.model.as_deref(),
        args.vector_dir.as_deref(),
        &options,
    )
    .await?;

    if results.is_empty() {
        println!("Nothing to embed.");
        return Ok(());
    }

    for result in &results {
        let status = match result.status {
            EmbedStatus::Embedded => "embedded",
            EmbedStatus::Planned => "planned",
            EmbedStatus::Skipped => "skipped",
            EmbedStatus::Failed => "FAILED",
        };
        let dims = result.dims.map(|d| format!(" ({d} dims)")).unwrap_or_default();
        println!("[{status}] {}{dims}", result.arxiv_id);
        if let Some(ref path) = result.vector_path {
            println!("    vector: {}", path.display());
        }
        if let Some(ref err) = result.error {
            println!("    error ({}): {err}", err.kind());
        }
    }

    let embedded = results
        .iter()
        .filter(|r| r.status == EmbedStatus::Embedded)
        .count();
    let failed = results.iter().filter(|r| !r.is_success()).count();
    println!();
    println!(
        "{embedded}/{} papers embedded with {backend}/{}, {failed} with errors",
        results.len(),
        results[0].model
    );
    Ok(())
}
