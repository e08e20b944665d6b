//! Deterministic offline embedder.

use async_trait::async_trait;

use sqlrag_core::{Embedder, Result, SqlRagError};

/// Default mock embedding dimension.
const DEFAULT_DIMENSION: usize = 512;

/// Mock embedder for testing.
///
/// Lower-cased alphanumeric tokens are hashed into buckets and the result is
/// L2 normalized, so texts sharing words score higher under cosine
/// similarity and the same text always yields the same vector.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with default settings.
    pub fn new() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Create a mock embedder with a custom dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            embedding[bucket] += 1.0;
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model(&self) -> &str {
        "mock-token-hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimension == 0 {
            return Err(SqlRagError::embedding("Mock embedder dimension is zero"));
        }
        Ok(self.embed_sync(text))
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.dimension(), 512);

        let embedding = embedder.embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 512);

        // Check L2 normalization
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::with_dimension(64);
        let a = embedder.embed("Table: Orders").await.unwrap();
        let b = embedder.embed("Table: Orders").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let embedder = MockEmbedder::new();
        let orders = embedder
            .embed("Table: Orders\nColumns:\n  - OrderDate (datetime)")
            .await
            .unwrap();
        let shippers = embedder
            .embed("Table: Shippers\nColumns:\n  - Phone (varchar)")
            .await
            .unwrap();
        let question = embedder.embed("latest orders by orderdate").await.unwrap();

        assert!(dot(&question, &orders) > dot(&question, &shippers));
    }

    #[tokio::test]
    async fn test_case_insensitive_tokens() {
        let embedder = MockEmbedder::new();
        let a = embedder.embed("ORDERS").await.unwrap();
        let b = embedder.embed("orders").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = MockEmbedder::with_dimension(8);
        let embedding = embedder.embed("  ").await.unwrap();
        assert_eq!(embedding, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_zero_dimension_rejected() {
        let embedder = MockEmbedder::with_dimension(0);
        assert!(embedder.embed("x").await.is_err());
    }
}
