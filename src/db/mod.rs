pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags};

use crate::error::{IngestError, Result};
use crate::paper::types::{
    EmbeddingBackend, EmbeddingRecord, PaperMetadata, ProcessingEvent, Stage, StageStatus,
};
use crate::paper::{embeddings, papers, processing};

/// Open (or create) the metadata database at the given path with pragmas set
/// and the schema initialized and migrated.
///
/// Any failure is reported as [`IngestError::StoreUnavailable`].
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let unavailable = |reason: String| IngestError::StoreUnavailable {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| {
                unavailable(format!("failed to create directory {}: {e}", parent.display()))
            })?;
    }

    let mut conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
    configure(&mut conn).map_err(|e| unavailable(e.to_string()))?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an existing database without write access. Used by dry runs, which
/// must not create or migrate anything.
pub fn open_read_only(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| IngestError::StoreUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(|e| IngestError::StoreUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    tracing::debug!(path = %path.display(), "database opened read-only");
    Ok(conn)
}

fn configure(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    schema::init_schema(conn)?;
    migrations::run_migrations(conn)?;
    Ok(())
}

/// Open a fully migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn)?;
    migrations::run_migrations(&mut conn)?;
    Ok(conn)
}

/// Shared async handle to the metadata store.
///
/// Wraps a single connection; each call takes the lock for the duration of
/// one statement or transaction on the blocking pool.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    read_only: bool,
}

impl Store {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_database(&open_path)).await??;
        Ok(Self::wrap(conn, path, false))
    }

    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_read_only(&open_path)).await??;
        Ok(Self::wrap(conn, path, true))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::wrap(open_memory_database()?, PathBuf::from(":memory:"), false))
    }

    fn wrap(conn: Connection, path: PathBuf, read_only: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            read_only,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| IngestError::StoreUnavailable {
                path,
                reason: "connection lock poisoned".into(),
            })?;
            f(&guard)
        })
        .await?
    }

    pub async fn upsert_paper(&self, paper: &PaperMetadata) -> Result<()> {
        let paper = paper.clone();
        self.call(move |conn| papers::upsert_paper(conn, &paper)).await
    }

    pub async fn get_paper(&self, arxiv_id: &str) -> Result<Option<PaperMetadata>> {
        let arxiv_id = arxiv_id.to_string();
        self.call(move |conn| papers::get_paper(conn, &arxiv_id)).await
    }

    pub async fn list_papers_missing_embedding(
        &self,
        backend: EmbeddingBackend,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PaperMetadata>> {
        let model = model.to_string();
        self.call(move |conn| papers::list_papers_missing_embedding(conn, backend, &model, limit))
            .await
    }

    pub async fn list_papers_with_text(&self, limit: Option<usize>) -> Result<Vec<PaperMetadata>> {
        self.call(move |conn| papers::list_papers_with_text(conn, limit)).await
    }

    pub async fn count_papers(&self) -> Result<i64> {
        self.call(papers::count_papers).await
    }

    pub async fn upsert_embedding(&self, record: EmbeddingRecord) -> Result<()> {
        self.call(move |conn| embeddings::upsert_embedding(conn, &record)).await
    }

    pub async fn get_embedding(
        &self,
        paper_id: &str,
        backend: EmbeddingBackend,
        model: &str,
    ) -> Result<Option<EmbeddingRecord>> {
        let paper_id = paper_id.to_string();
        let model = model.to_string();
        self.call(move |conn| embeddings::get_embedding(conn, &paper_id, backend, &model))
            .await
    }

    pub async fn get_embeddings_for_paper(&self, paper_id: &str) -> Result<Vec<EmbeddingRecord>> {
        let paper_id = paper_id.to_string();
        self.call(move |conn| embeddings::get_embeddings_for_paper(conn, &paper_id))
            .await
    }

    pub async fn count_embeddings(&self, backend: EmbeddingBackend, model: &str) -> Result<i64> {
        let model = model.to_string();
        self.call(move |conn| embeddings::count_embeddings(conn, backend, &model))
            .await
    }

    pub async fn record_stage(
        &self,
        paper_id: &str,
        run_id: Option<&str>,
        stage: Stage,
        status: StageStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let paper_id = paper_id.to_string();
        let run_id = run_id.map(str::to_string);
        let error = error.map(str::to_string);
        self.call(move |conn| {
            processing::record_stage(
                conn,
                &paper_id,
                run_id.as_deref(),
                stage,
                status,
                error.as_deref(),
            )
        })
        .await
    }

    pub async fn list_papers_by_stage_status(
        &self,
        stage: Stage,
        status: StageStatus,
    ) -> Result<Vec<ProcessingEvent>> {
        self.call(move |conn| processing::list_papers_by_stage_status(conn, stage, status))
            .await
    }

    pub async fn processing_history(&self, paper_id: &str) -> Result<Vec<ProcessingEvent>> {
        let paper_id = paper_id.to_string();
        self.call(move |conn| processing::processing_history(conn, &paper_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_database_creates_parent_dirs_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("papers.db");
        let conn = open_database(&path).unwrap();
        assert!(path.exists());
        assert_eq!(
            migrations::get_schema_version(&conn).unwrap(),
            migrations::CURRENT_SCHEMA_VERSION
        );

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn unopenable_path_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let err = open_database(blocker.join("papers.db")).unwrap_err();
        assert!(matches!(err, IngestError::StoreUnavailable { .. }));
        assert!(err.aborts_batch());
    }

    #[tokio::test]
    async fn store_handle_round_trips_papers() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_paper(&PaperMetadata::new("2101.00001", "T"))
            .await
            .unwrap();
        assert_eq!(store.count_papers().await.unwrap(), 1);
        assert!(store.get_paper("2101.00001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn read_only_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.db");
        drop(open_database(&path).unwrap());

        let store = Store::open_read_only(&path).await.unwrap();
        assert!(store.is_read_only());
        let result = store.upsert_paper(&PaperMetadata::new("x", "T")).await;
        assert!(matches!(result, Err(IngestError::Database(_))));
    }
}
