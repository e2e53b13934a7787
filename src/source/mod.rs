//! Paper discovery.
//!
//! [`SourceClient`] is the seam between the pipeline and the archive; the real
//! implementation is [`arxiv::ArxivClient`].

pub mod arxiv;

use async_trait::async_trait;

use crate::error::Result;
use crate::paper::PaperMetadata;

pub use arxiv::ArxivClient;

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Up to `max_results` descriptors for `query`, in relevance order.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperMetadata>>;

    /// The descriptor for one identifier, or `None` if it does not exist.
    async fn resolve(&self, arxiv_id: &str) -> Result<Option<PaperMetadata>>;
}
