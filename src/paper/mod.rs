pub mod embeddings;
pub mod papers;
pub mod processing;
pub mod types;

pub use types::{
    EmbedResult, EmbedStatus, EmbeddingBackend, EmbeddingRecord, PaperMetadata, PaperResult,
    PaperStatus, ProcessingEvent, Stage, StageStatus,
};
