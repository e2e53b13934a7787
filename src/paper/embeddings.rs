//! `embeddings` table access.
//!
//! Vectors are stored as little-endian `f32` blobs. Every vector stored for a
//! given `(backend, model)` pair must share one dimensionality.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{IngestError, Result};
use crate::paper::papers::parse_timestamp;
use crate::paper::types::{EmbeddingBackend, EmbeddingRecord};

/// Serialize a vector as little-endian `f32` bytes.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Insert or replace the vector for `(paper_id, backend, model)`.
///
/// Fails with [`IngestError::DimensionMismatch`] if other papers already hold
/// vectors of a different length for the same backend and model.
pub fn upsert_embedding(conn: &Connection, record: &EmbeddingRecord) -> Result<()> {
    if record.vector.is_empty() || record.dims != record.vector.len() {
        return Err(IngestError::Embedding(format!(
            "vector for {} has {} values but reports {} dims",
            record.paper_id,
            record.vector.len(),
            record.dims
        )));
    }

    let tx = conn.unchecked_transaction()?;

    let stored_dims: Option<i64> = tx
        .query_row(
            "SELECT dims FROM embeddings \
             WHERE backend = ?1 AND model = ?2 AND paper_id != ?3 LIMIT 1",
            params![record.backend.as_str(), record.model, record.paper_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(expected) = stored_dims {
        if expected as usize != record.dims {
            return Err(IngestError::DimensionMismatch {
                backend: record.backend.as_str().to_string(),
                model: record.model.clone(),
                expected: expected as usize,
                actual: record.dims,
            });
        }
    }

    tx.execute(
        "INSERT INTO embeddings (paper_id, backend, model, vector, dims, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(paper_id, backend, model) DO UPDATE SET \
            vector = excluded.vector, \
            dims = excluded.dims, \
            created_at = excluded.created_at",
        params![
            record.paper_id,
            record.backend.as_str(),
            record.model,
            vector_to_blob(&record.vector),
            record.dims as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;

    tx.commit()?;
    Ok(())
}

pub fn get_embedding(
    conn: &Connection,
    paper_id: &str,
    backend: EmbeddingBackend,
    model: &str,
) -> Result<Option<EmbeddingRecord>> {
    let record = conn
        .query_row(
            "SELECT paper_id, backend, model, vector, dims, created_at FROM embeddings \
             WHERE paper_id = ?1 AND backend = ?2 AND model = ?3",
            params![paper_id, backend.as_str(), model],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

pub fn get_embeddings_for_paper(conn: &Connection, paper_id: &str) -> Result<Vec<EmbeddingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT paper_id, backend, model, vector, dims, created_at FROM embeddings \
         WHERE paper_id = ?1 ORDER BY backend, model",
    )?;
    let records = stmt
        .query_map(params![paper_id], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn count_embeddings(conn: &Connection, backend: EmbeddingBackend, model: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM embeddings WHERE backend = ?1 AND model = ?2",
        params![backend.as_str(), model],
        |row| row.get(0),
    )?)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    let backend_raw: String = row.get(1)?;
    let backend = backend_raw.parse::<EmbeddingBackend>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    let blob: Vec<u8> = row.get(3)?;
    let dims: i64 = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(EmbeddingRecord {
        paper_id: row.get(0)?,
        backend,
        model: row.get(2)?,
        vector: blob_to_vector(&blob),
        dims: dims as usize,
        created_at: parse_timestamp(5, &created_at)?,
    })
}
