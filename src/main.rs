use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use faq_web_rag::commands::{ingest_faq, ingest_web, search, show_status};
use faq_web_rag::config::{Config, resolve_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "faq-web-rag")]
#[command(about = "Answer questions from a FAQ knowledge base and cached web search results")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.faq-web-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend and Ollama connection
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load a FAQ dataset (.json array or one record per line)
    IngestFaq {
        /// Path to the dataset file
        path: PathBuf,
        /// Target collection, defaults to the one behind the "faq" source
        #[arg(long)]
        collection: Option<String>,
    },
    /// Store a saved web search response (JSON with an "organic" array)
    IngestWeb {
        /// Path to the response file, or "-" for stdin
        input: String,
        /// Query the results were fetched for
        #[arg(long)]
        query: String,
        /// Target collection, defaults to the one behind the "web" source
        #[arg(long)]
        collection: Option<String>,
    },
    /// Search all configured sources
    Search {
        query: String,
        /// Only query the named source
        #[arg(long)]
        source: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show collections and search source status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::IngestFaq { path, collection } => {
            ingest_faq(&Config::load(&config_dir)?, &path, collection).await?;
        }
        Commands::IngestWeb {
            input,
            query,
            collection,
        } => {
            ingest_web(&Config::load(&config_dir)?, &input, &query, collection).await?;
        }
        Commands::Search {
            query,
            source,
            json,
        } => {
            search(&Config::load(&config_dir)?, &query, source.as_deref(), json).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}
