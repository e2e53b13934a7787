//! SQL DDL for the base (version 1) schema.
//!
//! Defines the `papers`, `embeddings`, and `schema_meta` tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization. Later tables are added by
//! [`super::migrations`].

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- One row per distinct arXiv paper
CREATE TABLE IF NOT EXISTS papers (
    arxiv_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]',
    abstract TEXT NOT NULL DEFAULT '',
    pdf_url TEXT NOT NULL,
    published TEXT,
    local_pdf_path TEXT,
    text_path TEXT,
    ingested_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_papers_text_path ON papers(text_path);

-- One vector per (paper, backend, model)
CREATE TABLE IF NOT EXISTS embeddings (
    paper_id TEXT NOT NULL REFERENCES papers(arxiv_id) ON DELETE CASCADE,
    backend TEXT NOT NULL CHECK(backend IN ('remote_api','local_model')),
    model TEXT NOT NULL,
    vector BLOB NOT NULL,
    dims INTEGER NOT NULL CHECK(dims > 0),
    created_at TEXT NOT NULL,
    PRIMARY KEY (paper_id, backend, model)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(backend, model);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize the base tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
