//! # kissql-core
//!
//! Core types and traits for KISSQL, the query language used to search a
//! corpus of ingested news articles.
//!
//! This crate provides the pieces shared by the parser, the executor and the
//! retrieval backends:
//!
//! - **Articles**: [`ArticleId`], [`FieldValue`], [`Metadata`], [`Article`]
//! - **Predicates**: [`Predicate`], the backend-neutral form of a constraint
//! - **Retrieval traits**: [`SemanticRetriever`], [`StructuredStore`], [`MetadataSource`]
//! - **Embedding**: [`Embedder`]
//! - **Errors**: [`LexError`], [`ParseError`], [`TypeError`], [`ExecutionError`]
//!
//! ## Architecture
//!
//! ```text
//! query string → tokens → StructuredQuery → Predicates + retrieval calls
//!                                                    ↓
//!                      SearchResponse ← pipes ← rank ← merge
//! ```
//!
//! ## Related Crates
//!
//! - `kissql-query`: Tokenizer, parser, constraint compiler and hybrid executor
//! - `kissql-embed`: Deterministic local embeddings
//! - `kissql-store`: In-memory article store

pub mod error;
pub mod predicate;
pub mod traits;
pub mod types;

pub use error::{
    EmbedError, Error, ExecutionError, ExecutionStage, LexError, ParseError, Result, StoreError,
    TypeError,
};
pub use predicate::{CompareOp, Comparable, Predicate, PredicateKind};
pub use traits::*;
pub use types::*;
