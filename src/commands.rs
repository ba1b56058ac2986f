use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::embeddings::build_embedder;
use crate::indexer::{FaqIngestor, IngestPipeline, IngestSummary, WebSearchIngestor};
use crate::search::{CombinedAnswer, CombinedSearcher};

const DEFAULT_FAQ_COLLECTION: &str = "ml_faq_collection";
const DEFAULT_WEB_COLLECTION: &str = "web_search_collection";

/// Collection behind the named source, or `default` if it is not configured
fn source_collection(config: &Config, source: &str, default: &str) -> String {
    config
        .search
        .source(source)
        .map_or_else(|| default.to_string(), |s| s.collection.clone())
}

async fn pipeline(config: &Config, collection: &str) -> Result<IngestPipeline> {
    let embedder = build_embedder(config).context("Failed to initialize embedder")?;
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;

    Ok(
        IngestPipeline::from_config(config, embedder, store.collection(collection))
            .with_progress(true),
    )
}

fn print_summary(summary: &IngestSummary) {
    println!(
        "Stored {} records in collection '{}'",
        summary.ingested, summary.collection
    );
    if !summary.skipped.is_empty() {
        println!("Skipped {} records:", summary.skipped.len());
        for (index, reason) in &summary.skipped {
            println!("  #{}: {}", index, reason);
        }
    }
}

/// Load a FAQ dataset file into its collection
#[inline]
pub async fn ingest_faq(
    config: &Config,
    path: &Path,
    collection: Option<String>,
) -> Result<IngestSummary> {
    let collection =
        collection.unwrap_or_else(|| source_collection(config, "faq", DEFAULT_FAQ_COLLECTION));
    info!("Ingesting FAQ dataset {} into '{}'", path.display(), collection);

    let ingestor = FaqIngestor::new(pipeline(config, &collection).await?);
    let summary = ingestor
        .ingest_file(path)
        .await
        .with_context(|| format!("Failed to ingest FAQ dataset {}", path.display()))?;

    print_summary(&summary);
    Ok(summary)
}

/// Cache a saved search-proxy response; `-` reads it from stdin
#[inline]
pub async fn ingest_web(
    config: &Config,
    input: &str,
    query: &str,
    collection: Option<String>,
) -> Result<IngestSummary> {
    if query.trim().is_empty() {
        bail!("A non-empty --query is required to tag web results");
    }

    let body = if input == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read search response from stdin")?;
        body
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read search response: {}", input))?
    };

    let collection =
        collection.unwrap_or_else(|| source_collection(config, "web", DEFAULT_WEB_COLLECTION));
    info!("Ingesting web results for {:?} into '{}'", query, collection);

    let ingestor = WebSearchIngestor::new(pipeline(config, &collection).await?);
    let summary = ingestor
        .ingest_response(query, &body)
        .await
        .context("Failed to ingest web search results")?;

    print_summary(&summary);
    Ok(summary)
}

/// Query every configured source, or only `source` when given
#[inline]
pub async fn run_search(
    config: &Config,
    query: &str,
    source: Option<&str>,
) -> Result<CombinedAnswer> {
    let mut config = config.clone();
    if let Some(name) = source {
        config.search.sources.retain(|s| s.name == name);
        if config.search.sources.is_empty() {
            bail!("Unknown search source: {}", name);
        }
    }

    let embedder = build_embedder(&config).context("Failed to initialize embedder")?;
    let store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;
    let searcher = CombinedSearcher::from_config(&config, &store, &embedder)?;

    Ok(searcher.search(query).await?)
}

/// Run a search and print the answers
#[inline]
pub async fn search(config: &Config, query: &str, source: Option<&str>, json: bool) -> Result<()> {
    let answer = run_search(config, query, source).await?;

    if json {
        let output = serde_json::to_string_pretty(&answer.to_json())
            .context("Failed to serialize search results")?;
        println!("{}", output);
        return Ok(());
    }

    for entry in answer.answers() {
        println!("[{}]", entry.source);
        println!("{}", entry.outcome.text());
        println!();
    }

    for error in answer.errors() {
        warn!("{}", error);
        println!("⚠️  {}", error);
    }

    Ok(())
}

/// Show collections, their shape and how the configured sources map onto them
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("Configuration directory: {}", config.get_base_dir().display());
    println!(
        "Embedding backend: {:?} ({} dimensions)",
        config.embedding.backend, config.embedding.dimension
    );
    println!();

    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;

    let mut names = store
        .collection_names()
        .await
        .context("Failed to list collections")?;
    names.sort();

    if names.is_empty() {
        println!("No collections have been created yet.");
        println!("Use 'faq-web-rag ingest-faq <path>' to load a FAQ dataset.");
    } else {
        println!("Collections ({} total):", names.len());
        for name in &names {
            let collection = store.collection(name);
            match (collection.info().await, collection.count().await) {
                (Ok(info), Ok(count)) => println!(
                    "  📚 {}: {} records, {} dimensions, {} distance",
                    name, count, info.dimension, info.metric
                ),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Failed to inspect collection '{}': {}", name, e);
                    println!("  ❌ {}: {}", name, e);
                }
            }
        }
    }

    println!();
    println!("Search sources:");
    for source in &config.search.sources {
        let state = if names.contains(&source.collection) {
            "ready"
        } else {
            "missing collection"
        };
        println!(
            "  {} -> {} (top_k {}, timeout {}ms): {}",
            source.name, source.collection, source.top_k, source.timeout_ms, state
        );
    }

    Ok(())
}
