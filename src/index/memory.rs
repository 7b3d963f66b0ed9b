//! In-process semantic index
//!
//! Holds normalized vectors per partition behind an async RwLock. Needs no
//! external service, which makes it the default backend for a fresh checkout
//! and the deterministic backend for tests. Contents live only as long as the
//! process; the bootstrap's idempotent bulk indexing repopulates it cheaply.

use super::{round_score, truncate_graphemes, DocType, IndexDocument, SearchResult, SemanticIndex};
use crate::embed::{cosine_similarity, embed_in_batches, normalize_embedding, Embedder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct StoredDoc {
    id: String,
    vector: Vec<f32>,
    text: String,
    metadata: serde_json::Map<String, Value>,
}

/// In-memory vector index
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    snippet_max_chars: usize,
    partitions: RwLock<HashMap<DocType, Vec<StoredDoc>>>,
}

impl MemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize, snippet_max_chars: usize) -> Self {
        Self {
            embedder,
            batch_size,
            snippet_max_chars,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    fn to_result(&self, partition: DocType, doc: &StoredDoc, score: f32) -> SearchResult {
        let title = doc
            .metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        SearchResult {
            id: doc.id.clone(),
            doc_type: partition,
            title,
            snippet: truncate_graphemes(&doc.text, self.snippet_max_chars).to_string(),
            score,
            metadata: doc.metadata.clone(),
        }
    }
}

#[async_trait]
impl SemanticIndex for MemoryIndex {
    async fn ensure_ready(&self) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        for partition in DocType::all() {
            partitions.entry(partition).or_default();
        }
        Ok(())
    }

    async fn count(&self, partition: DocType) -> Result<usize> {
        let partitions = self.partitions.read().await;
        Ok(partitions.get(&partition).map(Vec::len).unwrap_or(0))
    }

    async fn upsert(&self, partition: DocType, doc: IndexDocument) -> Result<()> {
        let vectors = self.embedder.embed(vec![doc.text.clone()]).await?;
        let vector = vectors
            .first()
            .map(|v| normalize_embedding(v))
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;

        let mut partitions = self.partitions.write().await;
        let docs = partitions.entry(partition).or_default();
        let stored = StoredDoc {
            id: doc.id,
            vector,
            text: doc.text,
            metadata: doc.metadata,
        };
        match docs.iter_mut().find(|d| d.id == stored.id) {
            Some(existing) => *existing = stored,
            None => docs.push(stored),
        }
        Ok(())
    }

    async fn bulk_index(&self, partition: DocType, docs: Vec<IndexDocument>) -> Result<usize> {
        let existing = self.count(partition).await?;
        if existing > 0 {
            debug!(
                "Partition {} already populated ({} docs), skipping bulk index",
                partition, existing
            );
            return Ok(existing);
        }

        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;

        let mut partitions = self.partitions.write().await;
        let stored_docs = partitions.entry(partition).or_default();
        if !stored_docs.is_empty() {
            return Ok(stored_docs.len());
        }
        for (doc, vector) in docs.into_iter().zip(vectors) {
            stored_docs.push(StoredDoc {
                id: doc.id,
                vector: normalize_embedding(&vector),
                text: doc.text,
                metadata: doc.metadata,
            });
        }
        Ok(stored_docs.len())
    }

    async fn query(&self, partition: DocType, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.count(partition).await? == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(vec![text.to_string()]).await?;
        let query_vector = vectors
            .first()
            .map(|v| normalize_embedding(v))
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;

        let partitions = self.partitions.read().await;
        let docs = match partitions.get(&partition) {
            Some(docs) if !docs.is_empty() => docs,
            _ => return Ok(Vec::new()),
        };

        let mut results: Vec<SearchResult> = docs
            .iter()
            .map(|doc| {
                let score = round_score(cosine_similarity(&query_vector, &doc.vector).max(0.0));
                self.to_result(partition, doc, score)
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use serde_json::Map;

    fn make_index() -> MemoryIndex {
        MemoryIndex::new(Arc::new(HashEmbedder::new(256)), 32, 500)
    }

    fn doc(id: &str, text: &str) -> IndexDocument {
        let mut meta = Map::new();
        meta.insert("title".to_string(), Value::String(format!("Title {}", id)));
        IndexDocument::new(id, text, meta)
    }

    #[tokio::test]
    async fn test_bulk_index_is_idempotent() {
        let index = make_index();
        let docs = vec![doc("A", "cache reset procedure"), doc("B", "invoice export steps")];

        let first = index.bulk_index(DocType::KbArticle, docs.clone()).await.unwrap();
        assert_eq!(first, 2);

        // Re-indexing the same set is a no-op, not a duplication
        let second = index.bulk_index(DocType::KbArticle, docs).await.unwrap();
        assert_eq!(second, 2);
        assert_eq!(index.count(DocType::KbArticle).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_partition_returns_no_results() {
        let index = make_index();
        index.ensure_ready().await.unwrap();
        let results = index.query(DocType::Script, "anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_scores_are_bounded_and_sorted() {
        let index = make_index();
        index
            .bulk_index(
                DocType::KbArticle,
                vec![
                    doc("A", "reset the tenant cache after sync"),
                    doc("B", "export quarterly invoices to pdf"),
                    doc("C", "tenant cache flush steps"),
                ],
            )
            .await
            .unwrap();

        let results = index
            .query(DocType::KbArticle, "tenant cache reset", 3)
            .await
            .unwrap();
        assert!(!results.is_empty());
        for window in results.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        for r in &results {
            assert!((0.0..=1.0).contains(&r.score), "score {} out of bounds", r.score);
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = make_index();
        index.upsert(DocType::KbArticle, doc("A", "original text")).await.unwrap();
        index.upsert(DocType::KbArticle, doc("A", "replacement text")).await.unwrap();
        assert_eq!(index.count(DocType::KbArticle).await.unwrap(), 1);

        let results = index.query(DocType::KbArticle, "replacement text", 1).await.unwrap();
        assert_eq!(results[0].id, "A");
        assert!(results[0].snippet.contains("replacement"));
    }

    #[tokio::test]
    async fn test_exact_match_scores_high() {
        let index = make_index();
        index
            .upsert(DocType::Ticket, doc("T-1", "printer jams on label feed"))
            .await
            .unwrap();
        let results = index
            .query(DocType::Ticket, "printer jams on label feed", 1)
            .await
            .unwrap();
        assert!(results[0].score > 0.99);
    }
}
