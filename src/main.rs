mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arxiv_ingest::config::IngestConfig;

#[derive(Parser)]
#[command(
    name = "arxiv-ingest",
    version,
    about = "Ingest arXiv papers: search, download, extract, and embed"
)]
struct Cli {
    /// Config file (defaults to ~/.arxiv-ingest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download and extract a single paper by arXiv id
    Fetch {
        /// arXiv identifier, e.g. 2101.00001 or hep-th/9901001
        id: String,
        #[command(flatten)]
        run: cli::RunArgs,
    },
    /// Search arXiv and ingest the results
    Ingest {
        /// arXiv search query, e.g. "all:quantum computing"
        query: String,
        /// Maximum number of papers to ingest
        #[arg(long, short = 'n')]
        max_results: Option<usize>,
        #[command(flatten)]
        run: cli::RunArgs,
    },
    /// Compute embeddings for stored papers that lack them
    Embed(cli::embed::EmbedArgs),
    /// List papers whose latest entry for a stage has the given status
    Pending(cli::pending::PendingArgs),
    /// Manage local embedding models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download an ONNX model and tokenizer into the model cache
    Download {
        /// sentence-transformers model name
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IngestConfig::load_from(path)?,
        None => IngestConfig::load()?,
    };

    // Log to stderr so stdout carries only command output.
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Fetch { id, run } => cli::fetch::fetch(&config, &id, &run).await?,
        Command::Ingest {
            query,
            max_results,
            run,
        } => cli::ingest::ingest(&config, &query, max_results, &run).await?,
        Command::Embed(args) => cli::embed::embed(&config, &args).await?,
        Command::Pending(args) => cli::pending::pending(&config, &args).await?,
        Command::Model { action } => match action {
            ModelAction::Download { model } => {
                cli::model_download(&config.embedding, model.as_deref()).await?;
            }
        },
    }

    Ok(())
}
