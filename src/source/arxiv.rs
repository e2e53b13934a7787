//! arXiv Atom export API client.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::{Entry, Link};
use reqwest::{Client, StatusCode, Url};

use crate::config::SourceConfig;
use crate::error::{IngestError, Result};
use crate::paper::types::default_pdf_url;
use crate::paper::PaperMetadata;
use crate::source::SourceClient;

pub struct ArxivClient {
    client: Client,
    api_url: String,
}

impl ArxivClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    async fn query(&self, params: &[(&str, String)]) -> Result<Vec<PaperMetadata>> {
        let url = Url::parse_with_params(&self.api_url, params)
            .map_err(|e| IngestError::Config(format!("invalid api_url {}: {e}", self.api_url)))?;

        let url_text = url.to_string();
        tracing::debug!(url = %url_text, "querying arXiv");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Source(e.to_string()))?;

        let status = response.status();
        // Malformed ids and queries are answered with 400 rather than an empty feed.
        if status == StatusCode::BAD_REQUEST {
            return Err(IngestError::NotFound(format!("arXiv rejected request: {url_text}")));
        }
        if !status.is_success() {
            return Err(IngestError::Source(format!("arXiv API returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::Source(e.to_string()))?;
        parse_feed(&body)
    }
}

#[async_trait]
impl SourceClient for ArxivClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperMetadata>> {
        let mut papers = self
            .query(&[
                ("search_query", query.to_string()),
                ("start", "0".to_string()),
                ("max_results", max_results.to_string()),
            ])
            .await
            .map_err(|e| match e {
                IngestError::NotFound(msg) => IngestError::Source(msg),
                other => other,
            })?;
        papers.truncate(max_results);
        tracing::info!(query, found = papers.len(), "arXiv search complete");
        Ok(papers)
    }

    async fn resolve(&self, arxiv_id: &str) -> Result<Option<PaperMetadata>> {
        match self.query(&[("id_list", arxiv_id.to_string())]).await {
            Ok(papers) => Ok(papers.into_iter().next()),
            Err(IngestError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Parse an arXiv Atom response body into descriptors, skipping error entries.
pub fn parse_feed(body: &[u8]) -> Result<Vec<PaperMetadata>> {
    let feed = feed_rs::parser::parse(body)
        .map_err(|e| IngestError::Source(format!("failed to parse Atom feed: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .filter(|entry| !entry.id.contains("/api/errors"))
        .filter_map(entry_to_paper)
        .collect())
}

fn entry_to_paper(entry: Entry) -> Option<PaperMetadata> {
    let arxiv_id = id_from_entry_url(&entry.id)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| collapse_whitespace(&t.content))
        .unwrap_or_default();
    let abstract_text = entry
        .summary
        .as_ref()
        .map(|s| s.content.trim().to_string())
        .unwrap_or_default();
    let authors = entry
        .authors
        .iter()
        .map(|author| author.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    let pdf_url = pdf_link(&entry.links).unwrap_or_else(|| default_pdf_url(&arxiv_id));

    let mut paper = PaperMetadata::new(arxiv_id, title);
    paper.authors = authors;
    paper.abstract_text = abstract_text;
    paper.pdf_url = pdf_url;
    paper.published = entry.published;
    Some(paper)
}

/// `http://arxiv.org/abs/2101.00001v2` → `2101.00001v2`; old-style ids keep their slash.
fn id_from_entry_url(url: &str) -> Option<String> {
    let (_, id) = url.split_once("/abs/")?;
    let id = id.trim().trim_end_matches(".pdf");
    (!id.is_empty()).then(|| id.to_string())
}

fn pdf_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| {
            link.title.as_deref() == Some("pdf")
                || link.media_type.as_deref() == Some("application/pdf")
        })
        .map(|link| link.href.clone())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: search_query=all:quantum computing</title>
  <id>http://arxiv.org/api/cHxbiOdZaP56ODnBPIenZhzg5f8</id>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <updated>2021-01-05T00:00:00Z</updated>
    <published>2021-01-01T12:00:00Z</published>
    <title>Quantum   computing
      with qubits</title>
    <summary>  We compute things.  </summary>
    <author><name>Alice Smith</name></author>
    <author><name>Bob Jones</name></author>
    <link href="http://arxiv.org/abs/2101.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v2" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <updated>1999-01-01T00:00:00Z</updated>
    <published>1999-01-01T00:00:00Z</published>
    <title>Strings</title>
    <summary>Old style id.</summary>
    <author><name>Carol</name></author>
  </entry>
</feed>"#;

    const ERROR_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: id_list=bogus</title>
  <id>http://arxiv.org/api/xyz</id>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_bogus</id>
    <title>Error</title>
    <summary>incorrect id format for bogus</summary>
    <updated>2024-01-01T00:00:00-05:00</updated>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_in_order() {
        let papers = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.arxiv_id, "2101.00001v2");
        assert_eq!(first.title, "Quantum computing with qubits");
        assert_eq!(first.abstract_text, "We compute things.");
        assert_eq!(first.authors, vec!["Alice Smith", "Bob Jones"]);
        assert_eq!(first.pdf_url, "http://arxiv.org/pdf/2101.00001v2");
        assert!(first.published.is_some());
        assert!(first.local_pdf_path.is_none());
    }

    #[test]
    fn falls_back_to_default_pdf_url() {
        let papers = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();
        let old = &papers[1];
        assert_eq!(old.arxiv_id, "hep-th/9901001v1");
        assert_eq!(old.pdf_url, "https://arxiv.org/pdf/hep-th/9901001v1");
    }

    #[test]
    fn error_entries_are_ignored() {
        let papers = parse_feed(ERROR_FEED.as_bytes()).unwrap();
        assert!(papers.is_empty());
    }

    #[test]
    fn garbage_body_is_source_error() {
        let err = parse_feed(b"not xml at all").unwrap_err();
        assert!(matches!(err, IngestError::Source(_)));
    }

    #[test]
    fn id_extraction_handles_variants() {
        assert_eq!(
            id_from_entry_url("http://arxiv.org/abs/2101.00001v1").as_deref(),
            Some("2101.00001v1")
        );
        assert_eq!(
            id_from_entry_url("https://arxiv.org/abs/2101.00001.pdf").as_deref(),
            Some("2101.00001")
        );
        assert_eq!(id_from_entry_url("http://arxiv.org/api/xyz"), None);
    }

    #[tokio::test]
    #[ignore] // requires network access
    async fn live_search_returns_results() {
        let client = ArxivClient::new(&SourceConfig::default()).unwrap();
        let papers = client.search("all:quantum computing", 2).await.unwrap();
        assert!(!papers.is_empty());
        assert!(papers.len() <= 2);
    }
}
