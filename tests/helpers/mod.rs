#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use arxiv_ingest::db::Store;
use arxiv_ingest::download::{part_path, Downloader};
use arxiv_ingest::embedding::{Embedder, Embedding};
use arxiv_ingest::error::{IngestError, Result};
use arxiv_ingest::extract::Extractor;
use arxiv_ingest::retry::RetryPolicy;
use arxiv_ingest::source::SourceClient;
use arxiv_ingest::{EmbeddingBackend, Ingestor, PaperMetadata};

/// Descriptor with a title and abstract derived from the id.
pub fn paper(arxiv_id: &str) -> PaperMetadata {
    let mut paper = PaperMetadata::new(arxiv_id, format!("Paper {arxiv_id}"));
    paper.authors = vec!["Ada Lovelace".into(), "Alan Turing".into()];
    paper.abstract_text = format!("Abstract of {arxiv_id}.");
    paper
}

/// In-memory archive. `search` returns the first `max_results` entries
/// verbatim (duplicates included), or every entry when built with
/// [`FakeSource::ignoring_limit`].
pub struct FakeSource {
    papers: Vec<PaperMetadata>,
    fail_search: bool,
    ignore_limit: bool,
    pub searches: AtomicUsize,
}

impl FakeSource {
    pub fn new(papers: Vec<PaperMetadata>) -> Self {
        Self {
            papers,
            fail_search: false,
            ignore_limit: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn with_ids(ids: &[&str]) -> Self {
        Self::new(ids.iter().map(|id| paper(id)).collect())
    }

    /// Returns all of `ids` whatever limit the caller asks for.
    pub fn ignoring_limit(ids: &[&str]) -> Self {
        Self {
            ignore_limit: true,
            ..Self::with_ids(ids)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_search: true,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<PaperMetadata>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(IngestError::Source("search service unavailable".into()));
        }
        let limit = if self.ignore_limit {
            self.papers.len()
        } else {
            max_results
        };
        Ok(self.papers.iter().take(limit).cloned().collect())
    }

    async fn resolve(&self, arxiv_id: &str) -> Result<Option<PaperMetadata>> {
        Ok(self.papers.iter().find(|p| p.arxiv_id == arxiv_id).cloned())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Fails every attempt with a retryable error.
    Retryable,
    /// Fails every attempt with a fatal error.
    Fatal,
    /// Fails this many attempts with a retryable error, then succeeds.
    Transient(usize),
    /// Starts writing `<dest>.part` and never finishes.
    Stall,
}

/// Writes a small fake PDF to the destination. Behavior is keyed by URL.
#[derive(Default)]
pub struct FakeDownloader {
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    failures: HashMap<String, Failure>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts one fetch as in flight until dropped, including when the
/// fetch is cancelled by a timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, arxiv_id: &str, delay: Duration) -> Self {
        self.delays.insert(pdf_url(arxiv_id), delay);
        self
    }

    /// Delay for every URL without its own entry.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn with_failure(mut self, arxiv_id: &str, failure: Failure) -> Self {
        self.failures.insert(pdf_url(arxiv_id), failure);
        self
    }

    pub fn calls_for(&self, arxiv_id: &str) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.get(&pdf_url(arxiv_id)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Most fetches ever running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let _in_flight = InFlight::enter(&self.in_flight, &self.peak);

        if let Some(delay) = self.delays.get(url).or(self.default_delay.as_ref()) {
            tokio::time::sleep(*delay).await;
        }

        match self.failures.get(url) {
            Some(Failure::Retryable) => {
                return Err(IngestError::Retryable(format!("HTTP 503 for {url}")));
            }
            Some(Failure::Fatal) => {
                return Err(IngestError::Fatal(format!("HTTP 404 for {url}")));
            }
            Some(Failure::Transient(n)) if attempt <= *n => {
                return Err(IngestError::Retryable(format!("connection reset for {url}")));
            }
            Some(Failure::Stall) => {
                tokio::fs::write(part_path(dest), b"%PDF-1.4 trunc").await?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(IngestError::Retryable(format!("stalled on {url}")));
            }
            _ => {}
        }

        tokio::fs::write(dest, format!("%PDF-fake\n{url}\n")).await?;
        Ok(())
    }
}

fn pdf_url(arxiv_id: &str) -> String {
    arxiv_ingest::paper::types::default_pdf_url(arxiv_id)
}

/// Returns a paragraph naming the PDF's file stem. Stems registered with
/// [`FakeExtractor::unreadable`] fail as corrupt documents.
#[derive(Default)]
pub struct FakeExtractor {
    unreadable: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreadable(mut self, stem: &str) -> Self {
        self.unreadable.insert(stem.to_string());
        self
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, pdf_path: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.unreadable.contains(&stem) || !pdf_path.exists() {
            return Err(IngestError::Unreadable {
                path: pdf_path.to_path_buf(),
                reason: "not a PDF".into(),
            });
        }
        Ok(format!("Full text of {stem}.\n\nSecond paragraph."))
    }
}

/// Deterministic embedder: every component is `scale * (i + 1) + text.len()`.
pub struct FakeEmbedder {
    backend: EmbeddingBackend,
    model: String,
    dims: usize,
    scale: f32,
    fail_when: Option<(String, fn() -> IngestError)>,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(backend: EmbeddingBackend, model: &str, dims: usize) -> Self {
        Self {
            backend,
            model: model.to_string(),
            dims,
            scale: 1.0,
            fail_when: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn local(dims: usize) -> Self {
        Self::new(EmbeddingBackend::LocalModel, "fake-minilm", dims)
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Fail with `error()` whenever the input contains `needle`.
    pub fn failing_on(mut self, needle: &str, error: fn() -> IngestError) -> Self {
        self.fail_when = Some((needle.to_string(), error));
        self
    }

    pub fn expected_vector(&self, text: &str) -> Vec<f32> {
        (0..self.dims)
            .map(|i| self.scale * (i as f32 + 1.0) + text.len() as f32)
            .collect()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn backend(&self) -> EmbeddingBackend {
        self.backend
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((needle, error)) = &self.fail_when {
            if text.contains(needle.as_str()) {
                return Err(error());
            }
        }
        Ok(Embedding::new(self.expected_vector(text)))
    }
}

/// Ingestor over fakes with three immediate attempts per download.
pub fn test_ingestor(
    source: &Arc<FakeSource>,
    downloader: &Arc<FakeDownloader>,
    extractor: &Arc<FakeExtractor>,
) -> Ingestor {
    test_ingestor_with_policy(source, downloader, extractor, RetryPolicy::immediate(3))
}

pub fn test_ingestor_with_policy(
    source: &Arc<FakeSource>,
    downloader: &Arc<FakeDownloader>,
    extractor: &Arc<FakeExtractor>,
    policy: RetryPolicy,
) -> Ingestor {
    Ingestor::new(source.clone(), downloader.clone(), extractor.clone())
        .with_retry_policy(policy)
        .with_max_concurrency(4)
}

/// Workspace with an output directory and a database path, neither created yet.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn db(&self) -> PathBuf {
        self.dir.path().join("db").join("papers.db")
    }

    pub fn vectors(&self) -> PathBuf {
        self.dir.path().join("vectors")
    }
}

/// Store a paper whose text file contains `text`. Returns the stored record.
pub async fn seed_paper(store: &Store, dir: &Path, arxiv_id: &str, text: &str) -> PaperMetadata {
    let text_path = dir.join(format!("{}.txt", arxiv_id.replace('/', "_")));
    tokio::fs::create_dir_all(dir).await.unwrap();
    tokio::fs::write(&text_path, text).await.unwrap();

    let mut record = paper(arxiv_id);
    record.text_path = Some(text_path);
    store.upsert_paper(&record).await.unwrap();
    record
}
