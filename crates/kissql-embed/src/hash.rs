//! Feature-hashing text embedder.
//!
//! Each lowercased alphanumeric token is hashed with BLAKE3 into one of
//! `dimension` buckets with a sign bit, and the summed vector is L2
//! normalized. Texts that share vocabulary get a positive cosine similarity,
//! and identical texts always embed identically, which is all the local
//! search and the tests need from a model.

use async_trait::async_trait;
use kissql_core::{EmbedError, Embedder};

/// Default embedding width.
pub const DEFAULT_DIMENSION: usize = 256;

/// Deterministic bag-of-words embedder.
///
/// # Example
///
/// ```rust
/// use kissql_core::Embedder;
/// use kissql_embed::HashEmbedder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = HashEmbedder::new();
/// let vectors = embedder.embed_text(&["AI chips", "chip shortage"]).await?;
///
/// assert_eq!(vectors.len(), 2);
/// assert_eq!(vectors[0].len(), 256);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder with the default dimension (256).
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(DEFAULT_DIMENSION)
    }

    /// Create an embedder with a custom dimension (at least 1).
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "blake3-feature-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Cosine similarity; zero when either vector is zero or the widths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_text_dimensions() {
        let embedder = HashEmbedder::with_dimension(64);
        let vectors = embedder.embed_text(&["hello world", "goodbye"]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 64));
        assert_eq!(embedder.dimension(), 64);
    }

    #[tokio::test]
    async fn test_empty_batch_is_error() {
        let embedder = HashEmbedder::new();
        assert_eq!(
            embedder.embed_text(&[]).await.unwrap_err(),
            EmbedError::EmptyInput
        );
    }

    #[tokio::test]
    async fn test_embed_query_matches_embed_text() {
        let embedder = HashEmbedder::new();
        let query = embedder.embed_query("Large Language Models").await.unwrap();
        assert_eq!(query, embedder.embed_one("large language models"));
    }

    #[test]
    fn test_vectors_are_normalized() {
        let v = HashEmbedder::new().embed_one("artificial intelligence in robotics");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_text_without_tokens_is_zero() {
        let v = HashEmbedder::new().embed_one("  --- ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_is_more_similar() {
        let embedder = HashEmbedder::new();
        let query = embedder.embed_one("semiconductor export rules");
        let related = embedder.embed_one("new export rules hit semiconductor makers");
        let unrelated = embedder.embed_one("football transfer window closes");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
        assert!((cosine_similarity(&query, &query) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
