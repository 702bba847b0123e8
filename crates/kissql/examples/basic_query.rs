//! Basic example: querying an in-memory corpus
//!
//! This example builds a small corpus in code and runs a few KISSQL queries
//! against it, printing the structured form and the ranked hits.
//!
//! Run with:
//! ```bash
//! cargo run --example basic_query -- 'AI NOT Google category=tech | HEAD 3'
//! ```

use anyhow::{Context, Result};
use kissql_core::{Article, Metadata};
use kissql_embed::HashEmbedder;
use kissql_query::{parse, ExecutorConfig, QueryExecutor};
use kissql_store::MemoryStore;
use std::env;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_QUERIES: &[&str] = &[
    "AI chips",
    "AI NOT Google category=tech",
    "category=in(tech, energy) sort:publication_date:desc",
    r#""battery storage"~2^3 energy | HEAD 2"#,
];

fn article(id: &str, title: &str, category: &str, date: &str, score: f64) -> Article {
    Article::new(
        id,
        Metadata::new()
            .with("title", title)
            .with("category", category)
            .with("publication_date", date)
            .with("Score", score),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = MemoryStore::new(Arc::new(HashEmbedder::new()));
    store
        .upsert(vec![
            article("a1", "Google unveils new AI chips", "tech", "2024-03-02", 1.5),
            article("a2", "Startup ships AI chips for phones", "tech", "2024-04-18", 2.0),
            article("a3", "Grid battery storage doubles", "energy", "2024-02-11", 1.2),
            article("a4", "Storage of battery cells in cold climates", "energy", "2024-05-07", 0.4),
            article("a5", "Hospitals trial AI triage", "health", "2024-01-20", 0.9),
        ])
        .await
        .context("Failed to load articles")?;
    info!("Loaded {} articles", store.len().await);

    let executor = QueryExecutor::from_store(Arc::new(store), ExecutorConfig::default());

    let args: Vec<String> = env::args().skip(1).collect();
    let queries: Vec<&str> = if args.is_empty() {
        DEFAULT_QUERIES.to_vec()
    } else {
        args.iter().map(String::as_str).collect()
    };

    for query in queries {
        let parsed = parse(query).with_context(|| format!("Failed to parse {query:?}"))?;
        println!("> {query}");
        println!("  parsed: {parsed}");

        let response = executor
            .execute_parsed(&parsed)
            .await
            .context("Query execution failed")?;
        for warning in &response.warnings {
            println!("  warning: {warning}");
        }
        for hit in &response.hits {
            println!("  {} ({:.3})", hit.id, hit.score);
        }
        println!();
    }

    Ok(())
}
