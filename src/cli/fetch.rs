//! CLI `fetch` command: ingest one paper by id.

use anyhow::Result;

use arxiv_ingest::config::IngestConfig;
use arxiv_ingest::Ingestor;

use super::{print_paper_result, RunArgs};

pub async fn fetch(config: &IngestConfig, arxiv_id: &str, args: &RunArgs) -> Result<()> {
    let ingestor = Ingestor::from_config(config)?;
    let db_path = args.db_path(config);

    let result = ingestor
        .fetch_one(arxiv_id, args.output_dir(config), db_path.as_deref(), args.options())
        .await?;

    print_paper_result(&result);
    if let Some(err) = result.error {
        return Err(err.into());
    }
    Ok(())
}
