//! In-memory article store.
//!
//! This module provides a [`MemoryStore`] that keeps a corpus of articles in
//! memory. It's useful for:
//! - Searching small JSON corpora from the CLI
//! - End-to-end tests of the executor
//! - Exercising the client-side fallback, by limiting which fields it filters

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use kissql_core::{
    Article, ArticleId, Embedder, FieldValue, FilterOutcome, Metadata, MetadataSource, Predicate,
    ScoredId, SemanticRequest, SemanticRetriever, StoreError, StructuredStore,
};
use kissql_embed::cosine_similarity;

/// Field holding an article's topic cluster.
pub const CLUSTER_FIELD: &str = "cluster_id";

#[derive(Debug, Clone)]
struct StoredArticle {
    fields: Metadata,
    embedding: Vec<f32>,
}

/// In-memory article store.
///
/// Semantic search is brute-force cosine similarity over embeddings computed
/// at upsert time. Only articles with a positive similarity are returned.
///
/// # Example
///
/// ```rust
/// use kissql_core::{Article, Metadata, StructuredStore};
/// use kissql_embed::HashEmbedder;
/// use kissql_store::MemoryStore;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new(Arc::new(HashEmbedder::new()));
/// store
///     .upsert(vec![Article::new("a1", Metadata::new().with("title", "AI chips"))])
///     .await?;
///
/// assert_eq!(store.scan(None).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    text_fields: Vec<String>,
    /// Fields `filter` evaluates natively; `None` means all of them
    filterable: Option<HashSet<String>>,
    articles: Arc<RwLock<BTreeMap<ArticleId, StoredArticle>>>,
}

impl MemoryStore {
    /// Create an empty store that embeds `title`, `summary` and `content`.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            text_fields: vec!["title".into(), "summary".into(), "content".into()],
            filterable: None,
            articles: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Set which fields are concatenated for embedding.
    #[must_use]
    pub fn with_text_fields(mut self, fields: Vec<String>) -> Self {
        self.text_fields = fields;
        self
    }

    /// Restrict native filtering to these fields (case-insensitive).
    ///
    /// Predicates on any other field come back as
    /// [`FilterOutcome::Unsupported`].
    #[must_use]
    pub fn with_filterable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filterable = Some(
            fields
                .into_iter()
                .map(|f| f.as_ref().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Insert or replace articles. Articles without an embedding are embedded.
    pub async fn upsert(&self, articles: Vec<Article>) -> Result<usize, StoreError> {
        let texts: Vec<String> = articles
            .iter()
            .filter(|a| a.embedding.is_none())
            .map(|a| a.text(&self.text_fields))
            .collect();
        let mut computed = if texts.is_empty() {
            Vec::new()
        } else {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            self.embedder
                .embed_text(&refs)
                .await
                .map_err(|e| StoreError::Query(format!("embedding failed: {e}")))?
        }
        .into_iter();

        let count = articles.len();
        let mut store = self.articles.write().await;
        for article in articles {
            let embedding = match article.embedding {
                Some(embedding) => embedding,
                None => computed
                    .next()
                    .ok_or_else(|| StoreError::Query("embedder returned too few vectors".into()))?,
            };
            store.insert(
                article.id,
                StoredArticle {
                    fields: article.fields,
                    embedding,
                },
            );
        }
        debug!("Upserted {} articles", count);
        Ok(count)
    }

    /// Load a JSON array of articles from `path`.
    pub async fn load_corpus(&self, path: &Path) -> Result<usize, StoreError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Corpus(format!("{}: {e}", path.display())))?;
        let articles: Vec<Article> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corpus(format!("{}: {e}", path.display())))?;
        self.upsert(articles).await
    }

    /// Number of stored articles.
    pub async fn len(&self) -> usize {
        self.articles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.articles.read().await.is_empty()
    }

    fn is_filterable(&self, field: &str) -> bool {
        self.filterable
            .as_ref()
            .map_or(true, |fields| fields.contains(&field.to_ascii_lowercase()))
    }
}

/// Best-first, ties by id, positive scores only.
fn top_k(mut scored: Vec<ScoredId>, limit: usize) -> Vec<ScoredId> {
    scored.retain(|s| s.score > 0.0);
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(limit);
    scored
}

fn in_cluster(fields: &Metadata, cluster: i64) -> bool {
    match fields.get(CLUSTER_FIELD) {
        Some(FieldValue::Number(n)) => *n == cluster as f64,
        Some(FieldValue::Text(s)) => s.trim().parse::<i64>().is_ok_and(|n| n == cluster),
        _ => false,
    }
}

#[async_trait]
impl SemanticRetriever for MemoryStore {
    async fn retrieve(
        &self,
        request: &SemanticRequest,
        limit: usize,
    ) -> Result<Vec<ScoredId>, StoreError> {
        let articles = self.articles.read().await;

        let results = match request {
            SemanticRequest::Text(text) => {
                let query = self
                    .embedder
                    .embed_query(text)
                    .await
                    .map_err(|e| StoreError::Query(format!("embedding failed: {e}")))?;
                let scored = articles
                    .iter()
                    .map(|(id, a)| ScoredId::new(id.clone(), cosine_similarity(&query, &a.embedding)))
                    .collect();
                top_k(scored, limit)
            }
            SemanticRequest::SimilarTo(target) => match articles.get(target) {
                Some(anchor) => {
                    let scored = articles
                        .iter()
                        .filter(|(id, _)| *id != target)
                        .map(|(id, a)| {
                            ScoredId::new(id.clone(), cosine_similarity(&anchor.embedding, &a.embedding))
                        })
                        .collect();
                    top_k(scored, limit)
                }
                None => {
                    debug!("similar: unknown article {}", target);
                    Vec::new()
                }
            },
            SemanticRequest::Cluster(cluster) => articles
                .iter()
                .filter(|(_, a)| in_cluster(&a.fields, *cluster))
                .take(limit)
                .map(|(id, _)| ScoredId::new(id.clone(), 1.0))
                .collect(),
        };

        debug!("Semantic retrieval returned {} candidates", results.len());
        Ok(results)
    }
}

#[async_trait]
impl StructuredStore for MemoryStore {
    async fn filter(&self, predicate: &Predicate) -> Result<FilterOutcome, StoreError> {
        if !self.is_filterable(&predicate.field) {
            return Ok(FilterOutcome::Unsupported);
        }
        let articles = self.articles.read().await;
        Ok(FilterOutcome::Matched(
            articles
                .iter()
                .filter(|(_, a)| predicate.matches(&a.fields))
                .map(|(id, _)| id.clone())
                .collect(),
        ))
    }

    async fn scan(&self, limit: Option<usize>) -> Result<Vec<ArticleId>, StoreError> {
        let articles = self.articles.read().await;
        Ok(articles
            .keys()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MetadataSource for MemoryStore {
    async fn metadata(
        &self,
        ids: &[ArticleId],
    ) -> Result<HashMap<ArticleId, Metadata>, StoreError> {
        let articles = self.articles.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| articles.get(id).map(|a| (id.clone(), a.fields.clone())))
            .collect())
    }
}
