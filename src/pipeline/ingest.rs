//! Single-paper and query ingestion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::Instrument;

use super::{open_store, ArtifactPaths, Ingestor, RunOptions};
use crate::db::Store;
use crate::download::remove_partial;
use crate::error::{IngestError, Result};
use crate::paper::{PaperMetadata, PaperResult, PaperStatus, Stage, StageStatus};

/// Per-invocation state shared by every paper in a run.
struct RunContext {
    output_dir: PathBuf,
    store: Option<Store>,
    options: RunOptions,
    run_id: String,
}

impl RunContext {
    async fn prepare(
        output_dir: &Path,
        db_path: Option<&Path>,
        options: RunOptions,
    ) -> Result<Self> {
        let store = open_store(db_path, options.dry_run).await?;
        if !options.dry_run {
            tokio::fs::create_dir_all(output_dir.join("texts")).await?;
        }
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            store,
            options,
            run_id: uuid::Uuid::now_v7().to_string(),
        })
    }

    /// Store that may be written to during this run.
    fn writable_store(&self) -> Option<&Store> {
        self.store.as_ref().filter(|s| !s.is_read_only())
    }

    /// Append to the processing log. The log is diagnostic; a failed append
    /// is reported but does not fail the paper.
    async fn record(
        &self,
        paper_id: &str,
        stage: Stage,
        status: StageStatus,
        error: Option<&IngestError>,
    ) {
        let Some(store) = self.writable_store() else {
            return;
        };
        let message = error.map(|e| e.to_string());
        if let Err(e) = store
            .record_stage(paper_id, Some(self.run_id.as_str()), stage, status, message.as_deref())
            .await
        {
            tracing::warn!(
                arxiv_id = paper_id,
                stage = stage.as_str(),
                error = %e,
                "failed to record processing event"
            );
        }
    }
}

impl Ingestor {
    /// Resolve, download and extract one paper.
    ///
    /// Fails with [`IngestError::NotFound`] when the id does not resolve.
    /// Download and extraction failures are attached to the returned result.
    pub async fn fetch_one(
        &self,
        arxiv_id: &str,
        output_dir: impl AsRef<Path>,
        db_path: Option<&Path>,
        options: RunOptions,
    ) -> Result<PaperResult> {
        let ctx = RunContext::prepare(output_dir.as_ref(), db_path, options).await?;
        let span = tracing::info_span!("fetch", run_id = %ctx.run_id, arxiv_id);

        async {
            let paper = self
                .source
                .resolve(arxiv_id)
                .await?
                .ok_or_else(|| IngestError::NotFound(arxiv_id.to_string()))?;
            Ok::<_, IngestError>(self.process_paper(&ctx, paper).await)
        }
        .instrument(span)
        .await
    }

    /// Search, then ingest at most `max_results` distinct results concurrently.
    ///
    /// Results are returned in the source's order. A failing search aborts;
    /// failing papers do not.
    pub async fn ingest_query(
        &self,
        query: &str,
        max_results: usize,
        output_dir: impl AsRef<Path>,
        db_path: Option<&Path>,
        options: RunOptions,
    ) -> Result<Vec<PaperResult>> {
        let ctx = RunContext::prepare(output_dir.as_ref(), db_path, options).await?;
        let span = tracing::info_span!("ingest", run_id = %ctx.run_id, query);

        async {
            let descriptors = self.source.search(query, max_results).await?;
            let papers: Vec<_> = dedup_by_id(descriptors)
                .into_iter()
                .take(max_results)
                .collect();
            let width = self.concurrency_for(max_results);
            tracing::info!(
                papers = papers.len(),
                concurrency = width,
                dry_run = options.dry_run,
                "ingesting query results"
            );

            let results: Vec<PaperResult> = stream::iter(papers)
                .map(|paper| self.process_paper(&ctx, paper))
                .buffered(width)
                .collect()
                .await;

            log_summary(&results);
            Ok::<_, IngestError>(results)
        }
        .instrument(span)
        .await
    }

    async fn process_paper(&self, ctx: &RunContext, mut paper: PaperMetadata) -> PaperResult {
        let paths = ArtifactPaths::for_paper(&ctx.output_dir, &paper.arxiv_id);

        if !ctx.options.force {
            if let Some(existing) = self.reusable_artifacts(ctx, &paper.arxiv_id).await {
                return self.reuse(ctx, paper, existing).await;
            }
        }

        if ctx.options.dry_run {
            tracing::info!(
                arxiv_id = %paper.arxiv_id,
                pdf = %paths.pdf.display(),
                "dry run: would download"
            );
            return PaperResult {
                paper,
                pdf_path: paths.pdf,
                text_path: paths.text,
                status: PaperStatus::Planned,
                error: None,
            };
        }

        if let Some(store) = ctx.writable_store() {
            if let Err(e) = store.upsert_paper(&paper).await {
                return failed(paper, paths, e);
            }
        }

        ctx.record(&paper.arxiv_id, Stage::Download, StageStatus::Pending, None).await;
        let label = format!("download {}", paper.arxiv_id);
        let downloaded = self
            .retry
            .run(&label, || self.downloader.fetch(&paper.pdf_url, &paths.pdf))
            .await;
        if let Err(e) = downloaded {
            // A timed-out attempt is dropped mid-write and cannot clean up after itself.
            remove_partial(&paths.pdf).await;
            tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "download failed");
            ctx.record(&paper.arxiv_id, Stage::Download, StageStatus::Error, Some(&e)).await;
            return failed(paper, paths, e);
        }
        ctx.record(&paper.arxiv_id, Stage::Download, StageStatus::Success, None).await;
        paper.local_pdf_path = Some(paths.pdf.clone());

        let extracted = match self.extractor.extract(&paths.pdf).await {
            Ok(text) => tokio::fs::write(&paths.text, text.as_bytes())
                .await
                .map_err(IngestError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = extracted {
            tracing::warn!(
                arxiv_id = %paper.arxiv_id,
                error = %e,
                "extraction failed, keeping PDF"
            );
            ctx.record(&paper.arxiv_id, Stage::Extract, StageStatus::Error, Some(&e)).await;
            if let Some(store) = ctx.writable_store() {
                if let Err(store_err) = store.upsert_paper(&paper).await {
                    tracing::warn!(
                        arxiv_id = %paper.arxiv_id,
                        error = %store_err,
                        "failed to record PDF path"
                    );
                }
            }
            return failed(paper, paths, e);
        }
        ctx.record(&paper.arxiv_id, Stage::Extract, StageStatus::Success, None).await;
        paper.text_path = Some(paths.text.clone());

        if let Some(store) = ctx.writable_store() {
            if let Err(e) = store.upsert_paper(&paper).await {
                return failed(paper, paths, e);
            }
        }

        tracing::info!(arxiv_id = %paper.arxiv_id, text = %paths.text.display(), "paper ingested");
        PaperResult {
            paper,
            pdf_path: paths.pdf,
            text_path: paths.text,
            status: PaperStatus::Ingested,
            error: None,
        }
    }

    /// Stored record whose PDF and text both still exist on disk.
    async fn reusable_artifacts(&self, ctx: &RunContext, arxiv_id: &str) -> Option<PaperMetadata> {
        let store = ctx.store.as_ref()?;
        let existing = match store.get_paper(arxiv_id).await {
            Ok(existing) => existing?,
            Err(e) => {
                tracing::warn!(arxiv_id, error = %e, "dedup lookup failed, ingesting afresh");
                return None;
            }
        };

        if !existing.has_artifacts() {
            return None;
        }
        let pdf_ok = existing.local_pdf_path.as_deref().is_some_and(Path::exists);
        let text_ok = existing.text_path.as_deref().is_some_and(Path::exists);
        (pdf_ok && text_ok).then_some(existing)
    }

    async fn reuse(
        &self,
        ctx: &RunContext,
        mut paper: PaperMetadata,
        existing: PaperMetadata,
    ) -> PaperResult {
        paper.local_pdf_path = existing.local_pdf_path;
        paper.text_path = existing.text_path;
        paper.ingested_at = existing.ingested_at;
        let pdf_path = paper.local_pdf_path.clone().unwrap_or_default();
        let text_path = paper.text_path.clone().unwrap_or_default();

        if let Some(store) = ctx.writable_store() {
            if let Err(e) = store.upsert_paper(&paper).await {
                let paths = ArtifactPaths {
                    pdf: pdf_path,
                    text: text_path,
                };
                return failed(paper, paths, e);
            }
        }

        tracing::info!(arxiv_id = %paper.arxiv_id, "reusing existing artifacts");
        PaperResult {
            paper,
            pdf_path,
            text_path,
            status: PaperStatus::Reused,
            error: None,
        }
    }
}

fn failed(paper: PaperMetadata, paths: ArtifactPaths, error: IngestError) -> PaperResult {
    PaperResult {
        paper,
        pdf_path: paths.pdf,
        text_path: paths.text,
        status: PaperStatus::Failed,
        error: Some(error),
    }
}

/// Keep the first occurrence of every id, preserving order.
fn dedup_by_id(papers: Vec<PaperMetadata>) -> Vec<PaperMetadata> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|p| seen.insert(p.arxiv_id.clone()))
        .collect()
}

fn log_summary(results: &[PaperResult]) {
    let count = |status: PaperStatus| results.iter().filter(|r| r.status == status).count();
    tracing::info!(
        ingested = count(PaperStatus::Ingested),
        reused = count(PaperStatus::Reused),
        planned = count(PaperStatus::Planned),
        failed = count(PaperStatus::Failed),
        "ingestion finished"
    );
}
