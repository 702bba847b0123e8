//! Article storage for KISSQL.
//!
//! This crate provides [`MemoryStore`], an in-memory corpus that implements
//! every collaborator the executor needs:
//!
//! - [`SemanticRetriever`](kissql_core::SemanticRetriever): brute-force cosine search
//! - [`StructuredStore`](kissql_core::StructuredStore): predicate pushdown and scans
//! - [`MetadataSource`](kissql_core::MetadataSource): field lookup
//!
//! # Example
//!
//! ```rust,ignore
//! use kissql_embed::HashEmbedder;
//! use kissql_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = MemoryStore::new(Arc::new(HashEmbedder::new()));
//! store.load_corpus("articles.json".as_ref()).await?;
//! ```

pub mod memory;

pub use memory::MemoryStore;
