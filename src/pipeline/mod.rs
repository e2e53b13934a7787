//! Ingestion orchestrator.
//!
//! [`Ingestor`] drives search, download, extraction, deduplication, and
//! persistence for single papers and whole queries. The embedding backfill
//! lives in [`embed`]. Collaborators are injected as trait objects so tests can
//! substitute fakes.

pub mod embed;
pub mod ingest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::db::Store;
use crate::download::{Downloader, HttpDownloader};
use crate::error::Result;
use crate::extract::{Extractor, PdfExtractor};
use crate::paper::types::safe_file_stem;
use crate::retry::RetryPolicy;
use crate::source::{ArxivClient, SourceClient};

pub use embed::{embed_backfill, embed_missing, embed_paper, EmbedOptions};

/// Toggles shared by `fetch_one` and `ingest_query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve only: no downloads, no directory creation, no file or store writes.
    pub dry_run: bool,
    /// Download and extract again even when usable artifacts already exist.
    pub force: bool,
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            force: false,
        }
    }

    pub fn forced() -> Self {
        Self {
            dry_run: false,
            force: true,
        }
    }
}

pub struct Ingestor {
    source: Arc<dyn SourceClient>,
    downloader: Arc<dyn Downloader>,
    extractor: Arc<dyn Extractor>,
    retry: RetryPolicy,
    max_concurrency: usize,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn SourceClient>,
        downloader: Arc<dyn Downloader>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            source,
            downloader,
            extractor,
            retry: RetryPolicy::default(),
            max_concurrency: 4,
        }
    }

    /// Wire the arXiv client, HTTP downloader and PDF extractor from config.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let source = ArxivClient::new(&config.source)?;
        let downloader = HttpDownloader::new(&config.source, &config.download)?;
        Ok(Self::new(Arc::new(source), Arc::new(downloader), Arc::new(PdfExtractor))
            .with_retry_policy(RetryPolicy::from_config(&config.download))
            .with_max_concurrency(config.ingest.max_concurrency))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Fan-out width for a query asking for `max_results` papers.
    pub fn concurrency_for(&self, max_results: usize) -> usize {
        max_results.min(self.max_concurrency).max(1)
    }
}

/// Where a paper's artifacts live under `output_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub pdf: PathBuf,
    pub text: PathBuf,
}

impl ArtifactPaths {
    pub fn for_paper(output_dir: &Path, arxiv_id: &str) -> Self {
        let stem = safe_file_stem(arxiv_id);
        Self {
            pdf: output_dir.join(format!("{stem}.pdf")),
            text: output_dir.join("texts").join(format!("{stem}.txt")),
        }
    }
}

/// Open the store for a run.
///
/// Without a path there is no store. Dry runs open an existing database
/// read-only and never create one.
pub(crate) async fn open_store(db_path: Option<&Path>, dry_run: bool) -> Result<Option<Store>> {
    match db_path {
        None => Ok(None),
        Some(path) if dry_run => {
            if path.exists() {
                Ok(Some(Store::open_read_only(path).await?))
            } else {
                tracing::debug!(path = %path.display(), "dry run: no existing store to consult");
                Ok(None)
            }
        }
        Some(path) => Ok(Some(Store::open(path).await?)),
    }
}
