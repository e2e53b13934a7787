//! Error taxonomy for the ingestion pipeline.
//!
//! Per-paper failures ([`IngestError::NotFound`], [`IngestError::Retryable`],
//! [`IngestError::Unreadable`], ...) are attached to individual results and never
//! abort a batch. [`IngestError::Config`] and [`IngestError::StoreUnavailable`]
//! abort the whole operation before any per-paper work starts.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The identifier did not resolve to any paper.
    #[error("paper not found: {0}")]
    NotFound(String),

    /// Transient failure (timeout, connection reset, HTTP 429/5xx).
    #[error("transient failure: {0}")]
    Retryable(String),

    /// Non-retryable download failure (e.g. HTTP 404).
    #[error("download failed: {0}")]
    Fatal(String),

    /// The search/resolve call itself failed.
    #[error("source query failed: {0}")]
    Source(String),

    /// The PDF could not be parsed or produced no text.
    #[error("unreadable document {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// Missing credential, missing model files, rejected credential.
    #[error("configuration error: {0}")]
    Config(String),

    /// The metadata store could not be opened or initialized.
    #[error("store unavailable at {}: {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    /// A paper's extracted text could not be loaded for embedding.
    #[error("no usable text for {arxiv_id}: {reason}")]
    MissingText { arxiv_id: String, reason: String },

    /// A vector's length disagrees with vectors already stored for the model.
    #[error("dimension mismatch for {backend}/{model}: stored vectors have {expected} dims, got {actual}")]
    DimensionMismatch {
        backend: String,
        model: String,
        expected: usize,
        actual: usize,
    },

    /// The embedding backend returned an unusable response.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Whether the retry policy should try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Errors that end the whole invocation instead of a single paper.
    pub fn aborts_batch(&self) -> bool {
        matches!(self, Self::Config(_) | Self::StoreUnavailable { .. })
    }

    /// Short machine-friendly label, used in the processing log and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Retryable(_) => "retryable",
            Self::Fatal(_) => "fatal",
            Self::Source(_) => "source",
            Self::Unreadable { .. } => "unreadable",
            Self::Config(_) => "config",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::MissingText { .. } => "missing_text",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Embedding(_) => "embedding",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Task(_) => "task",
        }
    }
}
