//! # KISSQL CLI
//!
//! Command-line interface for KISSQL, a compact query language for searching
//! a corpus of news articles by meaning and by metadata at once.
//!
//! ## Commands
//!
//! - `kissql parse <QUERY>` - Show the structured form of a query
//! - `kissql search --corpus <FILE> <QUERY>` - Run a query over a JSON corpus
//! - `kissql config show|init|path` - Inspect configuration
//!
//! ## Examples
//!
//! ```bash
//! # Parse a query
//! kissql parse 'AI NOT Google category=tech | HEAD 5'
//!
//! # Search a corpus
//! kissql search --corpus articles.json 'climate publication_date>=2024-01-01 sort:publication_date'
//!
//! # Get JSON output
//! kissql --format json search --corpus articles.json '"machine learning"~3^2'
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kissql_core::{Metadata, SearchResponse};
use kissql_embed::HashEmbedder;
use kissql_query::{QueryExecutor, QueryParser, StructuredQuery};
use kissql_store::MemoryStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "kissql")]
#[command(about = "Query a news article corpus with KISSQL")]
#[command(version)]
struct Cli {
    /// Config file path (default: ~/.config/kissql/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a query and print its structured form
    Parse {
        /// Query string
        query: String,
    },

    /// Execute a query against a JSON corpus
    Search {
        /// JSON array of articles
        #[arg(long)]
        corpus: PathBuf,

        /// Query string
        query: String,

        /// Cap on returned results (overrides `query.default_limit`)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Seed for SAMPLE, for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print a sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Search output for JSON format.
#[derive(Serialize)]
struct SearchOutput<'a> {
    query: String,
    parsed: &'a StructuredQuery,
    #[serde(flatten)]
    response: &'a SearchResponse,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    // Setup logging
    let level: Level = if cli.verbose {
        Level::DEBUG
    } else {
        config
            .logging
            .level
            .parse()
            .with_context(|| format!("Invalid log level `{}`", config.logging.level))?
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Parse { query } => {
            let parsed = QueryParser::default()
                .parse(&query)
                .context("Failed to parse query")?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&parsed)?);
                }
                OutputFormat::Text => {
                    println!("{parsed}");
                }
            }
        }

        Commands::Search {
            corpus,
            query,
            limit,
            seed,
        } => {
            let mut executor_config = config.to_executor_config();
            if let Some(limit) = limit {
                executor_config.default_limit = limit.min(executor_config.max_limit);
            }

            let embedder = Arc::new(HashEmbedder::with_dimension(config.embedding.dimension));
            let store = Arc::new(
                MemoryStore::new(embedder).with_text_fields(executor_config.text_fields.clone()),
            );
            let loaded = store
                .load_corpus(&corpus)
                .await
                .with_context(|| format!("Failed to load corpus {}", corpus.display()))?;
            info!("Loaded {} articles from {}", loaded, corpus.display());

            let parsed = QueryParser::default()
                .parse(&query)
                .context("Failed to parse query")?;

            let mut executor = QueryExecutor::from_store(store.clone(), executor_config);
            if let Some(seed) = seed {
                executor = executor.with_rng(StdRng::seed_from_u64(seed));
            }

            let response = executor
                .execute_parsed(&parsed)
                .await
                .context("Query execution failed")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        query: query.clone(),
                        parsed: &parsed,
                        response: &response,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    print_text(&parsed, &response, &store).await?;
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

async fn print_text(
    parsed: &StructuredQuery,
    response: &SearchResponse,
    store: &MemoryStore,
) -> Result<()> {
    use kissql_core::MetadataSource;

    println!("Query: {parsed}\n");
    for warning in &response.warnings {
        println!("warning: {warning}");
    }
    if !response.warnings.is_empty() {
        println!();
    }

    if response.hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let ids: Vec<_> = response.hits.iter().map(|hit| hit.id.clone()).collect();
    let metadata = store
        .metadata(&ids)
        .await
        .context("Failed to look up result metadata")?;

    for (i, hit) in response.hits.iter().enumerate() {
        println!("{}. {} (score: {:.3})", i + 1, hit.id, hit.score);
        if let Some(fields) = metadata.get(&hit.id) {
            if let Some(title) = text_field(fields, "title") {
                println!("   {}", truncate(title, 100));
            }
            if let Some(date) = text_field(fields, "publication_date") {
                println!("   {date}");
            }
        }
        println!();
    }
    Ok(())
}

fn text_field<'a>(fields: &'a Metadata, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(|value| value.as_text())
}

/// Truncate a string to max length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_len {
        s
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
