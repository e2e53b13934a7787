//! `papers` table access: upsert, lookup, listing, counting.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::paper::types::{EmbeddingBackend, PaperMetadata};

const PAPER_COLUMNS: &str = "arxiv_id, title, authors, abstract, pdf_url, published, \
                             local_pdf_path, text_path, ingested_at";

/// Insert or update a paper keyed by `arxiv_id`.
///
/// Descriptive fields are refreshed on conflict. Local paths are only
/// overwritten when the new value is non-null, and `ingested_at` keeps the
/// timestamp of the first sighting.
pub fn upsert_paper(conn: &Connection, paper: &PaperMetadata) -> Result<()> {
    let authors = serde_json::to_string(&paper.authors)?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO papers (arxiv_id, title, authors, abstract, pdf_url, published, \
                             local_pdf_path, text_path, ingested_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(arxiv_id) DO UPDATE SET \
            title = excluded.title, \
            authors = excluded.authors, \
            abstract = excluded.abstract, \
            pdf_url = excluded.pdf_url, \
            published = COALESCE(excluded.published, papers.published), \
            local_pdf_path = COALESCE(excluded.local_pdf_path, papers.local_pdf_path), \
            text_path = COALESCE(excluded.text_path, papers.text_path), \
            updated_at = excluded.updated_at",
        params![
            paper.arxiv_id,
            paper.title,
            authors,
            paper.abstract_text,
            paper.pdf_url,
            paper.published.map(|p| p.to_rfc3339()),
            paper.local_pdf_path.as_deref().map(path_to_sql),
            paper.text_path.as_deref().map(path_to_sql),
            paper.ingested_at.to_rfc3339(),
            now,
        ],
    )?;

    Ok(())
}

pub fn get_paper(conn: &Connection, arxiv_id: &str) -> Result<Option<PaperMetadata>> {
    let sql = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE arxiv_id = ?1");
    let paper = conn
        .query_row(&sql, params![arxiv_id], row_to_paper)
        .optional()?;
    Ok(paper)
}

/// Papers with extracted text but no vector for `(backend, model)`, oldest first.
pub fn list_papers_missing_embedding(
    conn: &Connection,
    backend: EmbeddingBackend,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PaperMetadata>> {
    let sql = format!(
        "SELECT {PAPER_COLUMNS} FROM papers p \
         WHERE p.text_path IS NOT NULL \
           AND NOT EXISTS (SELECT 1 FROM embeddings e \
                           WHERE e.paper_id = p.arxiv_id AND e.backend = ?1 AND e.model = ?2) \
         ORDER BY p.ingested_at, p.arxiv_id \
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let papers = stmt
        .query_map(
            params![backend.as_str(), model, sql_limit(limit)],
            row_to_paper,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(papers)
}

/// Every paper with extracted text, regardless of existing vectors.
pub fn list_papers_with_text(
    conn: &Connection,
    limit: Option<usize>,
) -> Result<Vec<PaperMetadata>> {
    let sql = format!(
        "SELECT {PAPER_COLUMNS} FROM papers WHERE text_path IS NOT NULL \
         ORDER BY ingested_at, arxiv_id LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let papers = stmt
        .query_map(params![sql_limit(limit)], row_to_paper)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(papers)
}

pub fn count_papers(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?)
}

/// SQLite treats a negative LIMIT as unbounded.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(-1)
}

fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_paper(row: &Row<'_>) -> rusqlite::Result<PaperMetadata> {
    let authors_json: String = row.get(2)?;
    let authors: Vec<String> = serde_json::from_str(&authors_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let published = row
        .get::<_, Option<String>>(5)?
        .map(|raw| parse_timestamp(5, &raw))
        .transpose()?;
    let ingested_at: String = row.get(8)?;

    Ok(PaperMetadata {
        arxiv_id: row.get(0)?,
        title: row.get(1)?,
        authors,
        abstract_text: row.get(3)?,
        pdf_url: row.get(4)?,
        published,
        local_pdf_path: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
        text_path: row.get::<_, Option<String>>(7)?.map(PathBuf::from),
        ingested_at: parse_timestamp(8, &ingested_at)?,
    })
}
