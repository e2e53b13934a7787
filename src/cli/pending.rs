//! CLI `pending` command: papers whose latest entry for a stage has a status.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use arxiv_ingest::config::IngestConfig;
use arxiv_ingest::db::Store;
use arxiv_ingest::paper::{Stage, StageStatus};

#[derive(Args, Debug)]
pub struct PendingArgs {
    /// SQLite database holding ingested papers (defaults to storage.db_path)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// `download`, `extract` or `embed`
    #[arg(long, default_value = "extract")]
    pub stage: Stage,
    /// `pending`, `success` or `error`
    #[arg(long, default_value = "pending")]
    pub status: StageStatus,
}

pub async fn pending(config: &IngestConfig, args: &PendingArgs) -> Result<()> {
    let db_path = args
        .db
        .clone()
        .or_else(|| config.resolved_db_path())
        .context("no database given: pass --db or set storage.db_path")?;
    let store = Store::open_read_only(&db_path).await?;

    let (stage, status) = (args.stage.as_str(), args.status.as_str());
    let events = store
        .list_papers_by_stage_status(args.stage, args.status)
        .await?;
    if events.is_empty() {
        println!("No papers with {stage} {status}.");
        return Ok(());
    }

    for event in &events {
        let run = event.run_id.as_deref().unwrap_or("-");
        println!("{}  {}  run {run}", event.paper_id, event.tried_at);
        if let Some(ref err) = event.error {
            println!("    error: {err}");
        }
    }
    println!();
    println!("{} papers with {stage} {status}", events.len());
    Ok(())
}
