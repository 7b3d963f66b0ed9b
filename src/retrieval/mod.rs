//! Retrieval fusion across index partitions
//!
//! Each requested partition is queried independently for up to `k` results;
//! the per-partition lists are concatenated in canonical order
//! (kb -> script -> ticket), stable-sorted by score descending, and cut to
//! `k`. Ties therefore resolve in partition order. Partitions are independent
//! indexes; no cross-partition score normalization is applied.

use crate::error::Result;
use crate::index::{DocType, SearchResult, SemanticIndex};
use futures::future::try_join_all;

/// Partition set in canonical query order for the given include flags
pub fn partitions_for(include_kb: bool, include_scripts: bool, include_tickets: bool) -> Vec<DocType> {
    DocType::all()
        .into_iter()
        .filter(|dt| match dt {
            DocType::KbArticle => include_kb,
            DocType::Script => include_scripts,
            DocType::Ticket => include_tickets,
        })
        .collect()
}

/// Fused top-k search across the requested partitions
pub async fn search(
    index: &dyn SemanticIndex,
    question: &str,
    partitions: &[DocType],
    k: usize,
) -> Result<Vec<SearchResult>> {
    if partitions.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let queries = partitions.iter().map(|&partition| index.query(partition, question, k));
    let per_partition = try_join_all(queries).await?;

    let mut fused: Vec<SearchResult> = per_partition.into_iter().flatten().collect();
    // Stable sort keeps partition query order on exact score ties
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(k);
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::index::{IndexDocument, MemoryIndex, SemanticIndex};
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn doc(id: &str, title: &str, text: &str) -> IndexDocument {
        let mut meta = Map::new();
        meta.insert("title".to_string(), Value::String(title.to_string()));
        IndexDocument::new(id, text, meta)
    }

    async fn seeded_index() -> MemoryIndex {
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(256)), 32, 500);
        index
            .bulk_index(
                DocType::KbArticle,
                vec![doc("KB-1", "Cache reset", "how to reset the tenant cache")],
            )
            .await
            .unwrap();
        index
            .bulk_index(
                DocType::Script,
                vec![doc("SCR-1", "Flush cache", "script to flush the tenant cache")],
            )
            .await
            .unwrap();
        index
            .bulk_index(
                DocType::Ticket,
                vec![doc("T-1", "Stale balances", "tenant cache held stale balances")],
            )
            .await
            .unwrap();
        index
    }

    #[test]
    fn test_partitions_for_is_canonical() {
        assert_eq!(
            partitions_for(true, true, true),
            vec![DocType::KbArticle, DocType::Script, DocType::Ticket]
        );
        assert_eq!(partitions_for(false, true, false), vec![DocType::Script]);
        assert!(partitions_for(false, false, false).is_empty());
    }

    #[tokio::test]
    async fn test_fused_results_are_sorted_descending() {
        let index = seeded_index().await;
        let results = search(&index, "tenant cache", &DocType::all(), 5).await.unwrap();

        assert!(!results.is_empty());
        for window in results.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }

    #[tokio::test]
    async fn test_ties_preserve_partition_order() {
        // Identical text in every partition embeds to identical vectors, so
        // all three hits tie exactly; fusion must keep kb -> script -> ticket.
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(256)), 32, 500);
        for (partition, id) in [
            (DocType::KbArticle, "KB-1"),
            (DocType::Script, "SCR-1"),
            (DocType::Ticket, "T-1"),
        ] {
            index
                .upsert(partition, doc(id, "same", "identical retrievable text"))
                .await
                .unwrap();
        }

        let results = search(&index, "identical retrievable text", &DocType::all(), 3)
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["KB-1", "SCR-1", "T-1"]);
    }

    #[tokio::test]
    async fn test_truncates_to_k() {
        let index = seeded_index().await;
        let results = search(&index, "tenant cache", &DocType::all(), 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_everywhere_yields_empty_list() {
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(64)), 32, 500);
        index.ensure_ready().await.unwrap();
        let results = search(&index, "anything at all", &DocType::all(), 5).await.unwrap();
        assert!(results.is_empty());
    }
}
