//! Deterministic feature-hashing embedder
//!
//! Maps token counts into a fixed-dimension vector using a stable blake3
//! hash, then L2-normalizes. The same text always produces the same vector,
//! so retrieval is reproducible with no model download or sidecar process.
//! Quality is bag-of-words; suitable as an offline default and for tests.

use super::{normalize_embedding, Embedder};
use crate::error::Result;
use async_trait::async_trait;

const HASH_MODEL_NAME: &str = "feature-hash-v1";

/// Feature-hashing embedder
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(|t| t.to_lowercase())
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in Self::tokenize(text) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = u64::from_le_bytes(word) as usize % self.dimension;
            // Sign bit from an independent part of the digest reduces
            // collision bias (standard feature-hashing trick).
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_embedding(&vector)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::cosine_similarity;

    #[tokio::test]
    async fn test_same_text_same_vector() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed(vec!["reset the cache".to_string()]).await.unwrap();
        let b = embedder.embed(vec!["reset the cache".to_string()]).await.unwrap();
        assert_eq!(a[0], b[0]);
        assert!((cosine_similarity(&a[0], &b[0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_disjoint_texts_score_low() {
        let embedder = HashEmbedder::new(256);
        let vecs = embedder
            .embed(vec![
                "reset the tenant cache".to_string(),
                "quarterly revenue projections spreadsheet".to_string(),
            ])
            .await
            .unwrap();
        let sim = cosine_similarity(&vecs[0], &vecs[1]);
        assert!(sim.abs() < 0.3, "disjoint token sets should be near-orthogonal, got {}", sim);
    }

    #[tokio::test]
    async fn test_vectors_are_normalized() {
        let embedder = HashEmbedder::new(32);
        let vecs = embedder.embed(vec!["some text here".to_string()]).await.unwrap();
        let norm: f32 = vecs[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
