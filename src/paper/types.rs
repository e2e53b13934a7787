//! Core paper and embedding type definitions.
//!
//! Defines [`PaperMetadata`] (one row of the `papers` table, also used as the
//! search descriptor before download), [`EmbeddingBackend`], [`EmbeddingRecord`],
//! the processing-log enums, and the per-item results returned by the pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Metadata for one paper, keyed by its arXiv identifier.
///
/// Source clients return this with both local paths unset; the pipeline fills
/// them in once the PDF is downloaded and the text extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    /// Stable arXiv identifier, e.g. `2101.00001v2` or `hep-th/9901001v1`.
    pub arxiv_id: String,
    pub title: String,
    /// Author names in publication order.
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Remote location of the PDF.
    pub pdf_url: String,
    /// Original publication timestamp reported by the archive.
    pub published: Option<DateTime<Utc>>,
    /// Downloaded PDF, once it exists on disk.
    pub local_pdf_path: Option<PathBuf>,
    /// Extracted plain-text file, once it exists on disk.
    pub text_path: Option<PathBuf>,
    /// When the paper was first seen. Preserved across re-ingestion.
    pub ingested_at: DateTime<Utc>,
}

impl PaperMetadata {
    /// Minimal descriptor with the arXiv default PDF location.
    pub fn new(arxiv_id: impl Into<String>, title: impl Into<String>) -> Self {
        let arxiv_id = arxiv_id.into();
        let pdf_url = default_pdf_url(&arxiv_id);
        Self {
            arxiv_id,
            title: title.into(),
            authors: Vec::new(),
            abstract_text: String::new(),
            pdf_url,
            published: None,
            local_pdf_path: None,
            text_path: None,
            ingested_at: Utc::now(),
        }
    }

    /// Both artifacts are recorded. Does not check the filesystem.
    pub fn has_artifacts(&self) -> bool {
        self.local_pdf_path.is_some() && self.text_path.is_some()
    }
}

/// `https://arxiv.org/pdf/<id>`
pub fn default_pdf_url(arxiv_id: &str) -> String {
    format!("https://arxiv.org/pdf/{arxiv_id}")
}

pub fn safe_file_stem(arxiv_id: &str) -> String {
    arxiv_id.replace(['/', '\\'], "_")
}

/// Which family of embedding backend produced a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Hosted, OpenAI-compatible embeddings API.
    RemoteApi,
    /// In-process ONNX model.
    LocalModel,
}

impl EmbeddingBackend {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteApi => "remote_api",
            Self::LocalModel => "local_model",
        }
    }

    /// Model used when the caller does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::RemoteApi => "text-embedding-3-small",
            Self::LocalModel => "all-MiniLM-L6-v2",
        }
    }
}

impl std::fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote_api" | "remote" | "api" | "openai" => Ok(Self::RemoteApi),
            "local_model" | "local" => Ok(Self::LocalModel),
            _ => Err(format!("unknown embedding backend: {s}. Supported: remote, local")),
        }
    }
}

/// One stored vector, unique per (paper_id, backend, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub paper_id: String,
    pub backend: EmbeddingBackend,
    pub model: String,
    pub vector: Vec<f32>,
    pub dims: usize,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(
        paper_id: impl Into<String>,
        backend: EmbeddingBackend,
        model: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        let dims = vector.len();
        Self {
            paper_id: paper_id.into(),
            backend,
            model: model.into(),
            vector,
            dims,
            created_at: Utc::now(),
        }
    }
}

/// Pipeline stage recorded in the `processing` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Extract,
    Embed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Embed => "embed",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(Self::Download),
            "extract" => Ok(Self::Extract),
            "embed" => Ok(Self::Embed),
            _ => Err(format!("unknown stage: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Success,
    Error,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("unknown stage status: {s}")),
        }
    }
}

/// A row of the `processing` log.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingEvent {
    pub paper_id: String,
    pub run_id: Option<String>,
    pub stage: Stage,
    pub status: StageStatus,
    pub error: Option<String>,
    pub tried_at: String,
}

/// Outcome of ingesting one paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    /// Downloaded and extracted during this run.
    Ingested,
    /// Existing artifacts were found and reused.
    Reused,
    /// Dry-run: paths are where files would be written.
    Planned,
    /// See the attached error.
    Failed,
}

/// Per-paper result of `fetch_one` / `ingest_query`.
#[derive(Debug)]
pub struct PaperResult {
    pub paper: PaperMetadata,
    /// Actual PDF path, or the would-be path under dry-run.
    pub pdf_path: PathBuf,
    /// Actual text path, or the would-be path under dry-run.
    pub text_path: PathBuf,
    pub status: PaperStatus,
    pub error: Option<IngestError>,
}

impl PaperResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Paths are planned rather than written.
    pub fn is_planned(&self) -> bool {
        self.status == PaperStatus::Planned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedStatus {
    Embedded,
    /// Dry-run: the paper would be embedded.
    Planned,
    /// No usable text; see the attached `MissingText` error.
    Skipped,
    Failed,
}

/// Per-paper result of the embedding pass.
#[derive(Debug)]
pub struct EmbedResult {
    pub arxiv_id: String,
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dims: Option<usize>,
    /// File written to the vector sink, if one was configured.
    pub vector_path: Option<PathBuf>,
    pub status: EmbedStatus,
    pub error: Option<IngestError>,
}

impl EmbedResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
