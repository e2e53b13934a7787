//! PDF text extraction and text cleanup.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::Document;

use crate::error::{IngestError, Result};

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Cleaned plain text of the document at `pdf_path`.
    async fn extract(&self, pdf_path: &Path) -> Result<String>;
}

/// `lopdf`-backed extractor. Parsing runs on the blocking pool.
#[derive(Debug, Default, Clone)]
pub struct PdfExtractor;

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, pdf_path: &Path) -> Result<String> {
        let path = pdf_path.to_path_buf();
        match tokio::task::spawn_blocking(move || extract_pdf_text(&path)).await {
            Ok(result) => result,
            Err(e) => Err(IngestError::Unreadable {
                path: pdf_path.to_path_buf(),
                reason: format!("extraction aborted: {e}"),
            }),
        }
    }
}

/// Synchronous extraction of every page, cleaned. Empty output is an error.
pub fn extract_pdf_text(pdf_path: &Path) -> Result<String> {
    let unreadable = |reason: String| IngestError::Unreadable {
        path: PathBuf::from(pdf_path),
        reason,
    };

    let document =
        Document::load(pdf_path).map_err(|e| unreadable(format!("failed to open: {e}")))?;
    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(unreadable("document has no pages".into()));
    }
    let page_numbers: Vec<u32> = pages.keys().copied().collect();

    let raw = document
        .extract_text(&page_numbers)
        .map_err(|e| unreadable(format!("failed to extract text: {e}")))?;

    let text = clean_text(&raw);
    if text.is_empty() {
        return Err(unreadable("no extractable text".into()));
    }

    tracing::debug!(
        path = %pdf_path.display(),
        pages = page_numbers.len(),
        chars = text.len(),
        "extracted text"
    );
    Ok(text)
}

/// Normalize extracted text.
///
/// Non-breaking spaces become spaces, line endings become `\n`, runs of spaces
/// and tabs collapse to one space, more than one blank line collapses to a
/// single blank line, and the result is trimmed.
pub fn clean_text(text: &str) -> String {
    let normalized = text
        .replace('\u{a0}', " ")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut spaced = String::with_capacity(normalized.len());
    let mut in_space = false;
    for ch in normalized.chars() {
        if ch == ' ' || ch == '\t' {
            if !in_space {
                spaced.push(' ');
            }
            in_space = true;
        } else {
            spaced.push(ch);
            in_space = false;
        }
    }

    let mut out = String::with_capacity(spaced.len());
    let mut newlines = 0usize;
    for ch in spaced.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push('\n');
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }

    out.trim().to_string()
}
