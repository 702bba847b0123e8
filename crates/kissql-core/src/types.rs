//! Core types for KISSQL.
//!
//! ## Articles
//! - [`ArticleId`]: Stable identifier of an ingested article
//! - [`FieldValue`]: A loosely typed metadata value
//! - [`Metadata`]: Field values of one article
//! - [`Article`]: An article as loaded into a store
//!
//! ## Retrieval
//! - [`SemanticRequest`]: What the semantic branch should retrieve
//! - [`ScoredId`]: A semantic match with its similarity
//! - [`FilterOutcome`]: Result of pushing a predicate to a store
//!
//! ## Results
//! - [`SearchHit`]: One ranked result
//! - [`SearchResponse`]: Ranked hits plus non-fatal warnings
//! - [`Warning`]: A non-fatal problem encountered while answering

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{ExecutionStage, TypeError};

// ============================================================================
// Articles
// ============================================================================

/// Identifier of an article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArticleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ArticleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A metadata value as stored for an article.
///
/// Dates are stored as ISO-8601 text and coerced when compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Textual content of this value, if it has any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Field values of one article, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, FieldValue>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Look up a field by exact name, falling back to an ASCII
    /// case-insensitive match.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field).or_else(|| {
            self.0
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(field))
                .map(|(_, value)| value)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An article as loaded into a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Unique article identifier
    pub id: ArticleId,
    /// All other fields (title, content, publication_date, ...)
    #[serde(flatten)]
    pub fields: Metadata,
    /// Precomputed embedding, if the corpus ships one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Article {
    pub fn new(id: impl Into<ArticleId>, fields: Metadata) -> Self {
        Self {
            id: id.into(),
            fields,
            embedding: None,
        }
    }

    /// Concatenate the textual values of `text_fields`, in order.
    pub fn text(&self, text_fields: &[String]) -> String {
        let mut parts = Vec::new();
        for field in text_fields {
            if let Some(FieldValue::Text(text)) = self.fields.get(field) {
                parts.push(text.as_str());
            }
        }
        parts.join("\n")
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// Input to the semantic retrieval branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SemanticRequest {
    /// Free text similarity
    Text(String),
    /// Nearest neighbours of an existing article
    SimilarTo(ArticleId),
    /// Members of a topic cluster
    Cluster(i64),
}

/// A semantic match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: ArticleId,
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: impl Into<ArticleId>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Result of pushing a predicate down to a store.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// Identifiers of all matching articles
    Matched(HashSet<ArticleId>),
    /// The store cannot evaluate this predicate; check it client-side
    Unsupported,
}

// ============================================================================
// Results
// ============================================================================

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ArticleId,
    /// Composite relevance score after boosts
    pub score: f32,
}

/// Ranked hits plus everything that went wrong without failing the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.id.as_str()).collect()
    }

    pub fn is_partial(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::PartialResult { .. }))
    }
}

/// A non-fatal problem attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A constraint was dropped because its value has the wrong type
    Type(TypeError),
    /// One retrieval branch failed; results come from the other
    PartialResult {
        stage: ExecutionStage,
        message: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(err) => write!(f, "dropped {err}"),
            Self::PartialResult { stage, message } => {
                write!(f, "partial results: {stage} failed: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_lookup_is_case_insensitive_fallback() {
        let meta = Metadata::new().with("Score", 1.5).with("score", 2.0);
        assert_eq!(meta.get("score"), Some(&FieldValue::Number(2.0)));
        assert_eq!(meta.get("Score"), Some(&FieldValue::Number(1.5)));

        let meta = Metadata::new().with("Sentiment", "Positive");
        assert_eq!(meta.get("sentiment"), Some(&FieldValue::from("Positive")));
        assert!(meta.get("missing").is_none());
    }

    #[test]
    fn test_article_deserialization_flattens_fields() {
        let json = r#"{
            "id": "a-17",
            "title": "AI chips",
            "score": 3,
            "tags": ["ai", "hardware"],
            "driver_type": null
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();

        assert_eq!(article.id, ArticleId::from("a-17"));
        assert_eq!(article.fields.get("title"), Some(&FieldValue::from("AI chips")));
        assert_eq!(article.fields.get("score"), Some(&FieldValue::Number(3.0)));
        assert_eq!(
            article.fields.get("tags"),
            Some(&FieldValue::List(vec!["ai".into(), "hardware".into()]))
        );
        assert_eq!(article.fields.get("driver_type"), Some(&FieldValue::Null));
        assert!(article.embedding.is_none());
    }

    #[test]
    fn test_article_text_joins_text_fields_in_order() {
        let article = Article::new(
            "a1",
            Metadata::new()
                .with("title", "Title")
                .with("content", "Body")
                .with("score", 1.0),
        );
        let fields = vec![
            "title".to_string(),
            "score".to_string(),
            "content".to_string(),
        ];
        assert_eq!(article.text(&fields), "Title\nBody");
    }

    #[test]
    fn test_search_response_serialization_skips_empty_warnings() {
        let response = SearchResponse {
            hits: vec![SearchHit {
                id: "a1".into(),
                score: 0.5,
            }],
            warnings: vec![],
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"hits":[{"id":"a1","score":0.5}]}"#);
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::PartialResult {
            stage: ExecutionStage::SemanticRetrieval,
            message: "timed out".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "partial results: semantic retrieval failed: timed out"
        );
        let response = SearchResponse {
            hits: vec![],
            warnings: vec![warning],
        };
        assert!(response.is_partial());
    }
}
