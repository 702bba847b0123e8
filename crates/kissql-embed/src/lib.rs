//! # kissql-embed
//!
//! Local, dependency-free text embeddings for KISSQL.
//!
//! [`HashEmbedder`] maps text to a fixed-width vector by feature hashing, so
//! semantic retrieval works offline and deterministically. It implements
//! [`kissql_core::Embedder`] and can be swapped for a model-backed embedder
//! without touching the executor.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HashEmbedder`] | BLAKE3 feature-hashing embedder |
//! | [`cosine_similarity`] | Similarity used by the in-memory store |

pub mod hash;

pub use hash::{cosine_similarity, HashEmbedder, DEFAULT_DIMENSION};
