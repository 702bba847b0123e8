//! Collaborator traits for the KISSQL executor.
//!
//! The executor never talks to a concrete backend. It sees three
//! capabilities, which a single store may implement together:
//!
//! - [`SemanticRetriever`]: Embedding similarity search
//! - [`StructuredStore`]: Predicate filtering and full scans
//! - [`MetadataSource`]: Field values for client-side checks and sorting
//!
//! [`Embedder`] is the seam between a semantic store and its model.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{EmbedError, StoreError};
use crate::predicate::Predicate;
use crate::types::{ArticleId, FilterOutcome, Metadata, ScoredId, SemanticRequest};

// ============================================================================
// Retrieval
// ============================================================================

/// Semantic (embedding similarity) retrieval.
#[async_trait]
pub trait SemanticRetriever: Send + Sync {
    /// Return up to `limit` matches, best first.
    async fn retrieve(
        &self,
        request: &SemanticRequest,
        limit: usize,
    ) -> Result<Vec<ScoredId>, StoreError>;
}

/// Structured / keyword retrieval.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Evaluate a predicate natively, or report it as unsupported.
    async fn filter(&self, predicate: &Predicate) -> Result<FilterOutcome, StoreError>;

    /// Enumerate article identifiers in a stable order.
    async fn scan(&self, limit: Option<usize>) -> Result<Vec<ArticleId>, StoreError>;
}

/// Candidate metadata lookup.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch metadata for the given ids. Unknown ids are omitted.
    async fn metadata(&self, ids: &[ArticleId])
        -> Result<HashMap<ArticleId, Metadata>, StoreError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a query (may use different instruction).
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError> {
        let results = self.embed_text(&[query]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}
