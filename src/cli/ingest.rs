//! CLI `ingest` command: search and ingest the results.

use anyhow::Result;

use arxiv_ingest::config::IngestConfig;
use arxiv_ingest::Ingestor;

use super::{print_paper_result, RunArgs};

pub async fn ingest(
    config: &IngestConfig,
    query: &str,
    max_results: Option<usize>,
    args: &RunArgs,
) -> Result<()> {
    let ingestor = Ingestor::from_config(config)?;
    let max_results = max_results.unwrap_or(config.ingest.max_results);
    let db_path = args.db_path(config);

    let results = ingestor
        .ingest_query(
            query,
            max_results,
            args.output_dir(config),
            db_path.as_deref(),
            args.options(),
        )
        .await?;

    if results.is_empty() {
        println!("No papers found for {query:?}.");
        return Ok(());
    }

    for result in &results {
        print_paper_result(result);
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    println!();
    println!("{} papers, {} failed", results.len(), failed);

    anyhow::ensure!(failed < results.len(), "every paper failed to ingest");
    Ok(())
}
