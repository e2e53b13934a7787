//! Append-only per-stage processing log.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::paper::types::{ProcessingEvent, Stage, StageStatus};

pub fn record_stage(
    conn: &Connection,
    paper_id: &str,
    run_id: Option<&str>,
    stage: Stage,
    status: StageStatus,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO processing (paper_id, run_id, stage, status, error, tried_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            paper_id,
            run_id,
            stage.as_str(),
            status.as_str(),
            error,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// All events for a paper in insertion order.
pub fn processing_history(conn: &Connection, paper_id: &str) -> Result<Vec<ProcessingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT paper_id, run_id, stage, status, error, tried_at FROM processing \
         WHERE paper_id = ?1 ORDER BY id",
    )?;
    let events = stmt
        .query_map(params![paper_id], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

/// The latest event of every paper whose most recent `stage` entry has `status`,
/// oldest first. Finds papers left pending or failed by earlier runs.
pub fn list_papers_by_stage_status(
    conn: &Connection,
    stage: Stage,
    status: StageStatus,
) -> Result<Vec<ProcessingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT p.paper_id, p.run_id, p.stage, p.status, p.error, p.tried_at \
         FROM processing p \
         WHERE p.stage = ?1 AND p.status = ?2 \
           AND p.id = (SELECT MAX(q.id) FROM processing q \
                       WHERE q.paper_id = p.paper_id AND q.stage = p.stage) \
         ORDER BY p.id",
    )?;
    let events = stmt
        .query_map(params![stage.as_str(), status.as_str()], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProcessingEvent> {
    let stage: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ProcessingEvent {
        paper_id: row.get(0)?,
        run_id: row.get(1)?,
        stage: stage.parse().map_err(|e: String| conversion_error(2, e))?,
        status: status.parse().map_err(|e: String| conversion_error(3, e))?,
        error: row.get(4)?,
        tried_at: row.get(5)?,
    })
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}
