pub mod embed;
pub mod fetch;
pub mod ingest;
pub mod pending;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use arxiv_ingest::config::{EmbeddingConfig, IngestConfig};
use arxiv_ingest::download::{part_path, remove_partial};
use arxiv_ingest::embedding::local::{model_dir, MODEL_FILE, TOKENIZER_FILE};
use arxiv_ingest::paper::{PaperResult, PaperStatus};
use arxiv_ingest::{EmbeddingBackend, RunOptions};

/// Flags shared by `fetch` and `ingest`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory for PDFs (texts go to <output>/texts)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
    /// SQLite database to record metadata in
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Resolve only; write nothing
    #[arg(long)]
    pub dry_run: bool,
    /// Download and extract again even if artifacts exist
    #[arg(long)]
    pub force: bool,
}

impl RunArgs {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            force: self.force,
        }
    }

    pub fn output_dir(&self, config: &IngestConfig) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| config.resolved_output_dir())
    }

    /// `--db` wins; otherwise the configured path, if any.
    pub fn db_path(&self, config: &IngestConfig) -> Option<PathBuf> {
        self.db.clone().or_else(|| config.resolved_db_path())
    }
}

pub fn print_paper_result(result: &PaperResult) {
    let status = match result.status {
        PaperStatus::Ingested => "ingested",
        PaperStatus::Reused => "reused",
        PaperStatus::Planned => "planned",
        PaperStatus::Failed => "FAILED",
    };
    println!("[{status}] {}  {}", result.paper.arxiv_id, result.paper.title);
    let note = if result.is_planned() { " (not written)" } else { "" };
    println!("    pdf:  {}{note}", result.pdf_path.display());
    println!("    text: {}{note}", result.text_path.display());
    if let Some(ref err) = result.error {
        println!("    error ({}): {err}", err.kind());
    }
}

/// Download the ONNX model and tokenizer for `model` to the cache directory.
pub async fn model_download(config: &EmbeddingConfig, model: Option<&str>) -> Result<()> {
    let model = model
        .map(str::to_string)
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| EmbeddingBackend::LocalModel.default_model().to_string());
    let dir = model_dir(config, &model);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create cache dir: {}", dir.display()))?;

    let base = format!("https://huggingface.co/sentence-transformers/{model}/resolve/main");
    let files = [
        (format!("{base}/onnx/model.onnx"), dir.join(MODEL_FILE)),
        (format!("{base}/tokenizer.json"), dir.join(TOKENIZER_FILE)),
    ];

    for (url, dest) in &files {
        let name = dest.file_name().unwrap_or_default().to_string_lossy();
        if dest.exists() {
            println!("{name} already exists at {}", dest.display());
            continue;
        }
        println!("Downloading {name} for {model}...");
        download_file(url, dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!(
        "Model download complete. Use it with `arxiv-ingest embed --backend local --model {model}`."
    );
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (`.part` + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .expect("valid template")
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = part_path(dest);
    let written = async {
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("error reading response")?;
            file.write_all(&chunk).await.context("error writing to file")?;
            pb.inc(chunk.len() as u64);
        }

        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, dest)
            .await
            .context("failed to rename temp file")
    }
    .await;
    if written.is_err() {
        remove_partial(dest).await;
    }
    written?;

    pb.finish_and_clear();
    Ok(())
}
