//! arXiv paper ingestion: search, download, extract, persist, and embed.
//!
//! Given a search query or an explicit arXiv identifier, the pipeline discovers
//! papers through the arXiv Atom API, downloads their PDFs, extracts plain text,
//! records metadata in SQLite, and optionally computes vector embeddings with a
//! hosted API or a local ONNX model.
//!
//! # Layout on disk
//!
//! | Artifact | Path |
//! |----------|------|
//! | PDF | `<output_dir>/<safe_id>.pdf` |
//! | Extracted text | `<output_dir>/texts/<safe_id>.txt` |
//! | Vector sink (optional) | `<vector_dir>/<backend>/<model>/<safe_id>.json` |
//!
//! `safe_id` is the arXiv id with `/` replaced by `_`.
//!
//! # Modules
//!
//! - [`pipeline`]: the [`pipeline::Ingestor`] orchestrator and the embedding backfill
//! - [`source`], [`download`], [`extract`]: collaborators behind async traits
//! - [`embedding`]: remote API and local ONNX backends behind [`embedding::Embedder`]
//! - [`db`], [`paper`]: SQLite schema, migrations, and table access
//! - [`config`], [`error`], [`retry`]: shared configuration, error taxonomy, and backoff

pub mod config;
pub mod db;
pub mod download;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod paper;
pub mod pipeline;
pub mod retry;
pub mod source;

pub use error::{IngestError, Result};
pub use paper::{EmbedResult, EmbeddingBackend, PaperMetadata, PaperResult, PaperStatus};
pub use pipeline::{EmbedOptions, Ingestor, RunOptions};
