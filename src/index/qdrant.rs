//! Qdrant-backed semantic index
//!
//! One collection per partition, cosine distance, deterministic UUIDv5 point
//! ids derived from document ids so re-upserting an article replaces its
//! point instead of duplicating it.

use super::{round_score, truncate_graphemes, DocType, IndexDocument, SearchResult, SemanticIndex};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const UPSERT_BATCH_SIZE: usize = 500;

/// Qdrant store handle covering all partitions
pub struct QdrantIndex {
    client: Qdrant,
    embedder: Arc<dyn Embedder>,
    collection_prefix: String,
    batch_size: usize,
    snippet_max_chars: usize,
}

impl QdrantIndex {
    /// Connect to Qdrant
    pub fn connect(
        url: &str,
        collection_prefix: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        snippet_max_chars: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            embedder,
            collection_prefix: collection_prefix.to_string(),
            batch_size,
            snippet_max_chars,
        })
    }

    fn collection_name(&self, partition: DocType) -> String {
        format!("{}_{}", self.collection_prefix, partition.collection_suffix())
    }

    fn point_struct(&self, doc: &IndexDocument, vector: Vec<f32>) -> PointStruct {
        let point_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, doc.id.as_bytes()).to_string();

        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert("document_id".to_string(), json_to_qdrant_value(Value::String(doc.id.clone())));
        payload.insert(
            "snippet".to_string(),
            json_to_qdrant_value(Value::String(
                truncate_graphemes(&doc.text, self.snippet_max_chars).to_string(),
            )),
        );
        payload.insert(
            "metadata".to_string(),
            json_to_qdrant_value(Value::Object(doc.metadata.clone())),
        );

        PointStruct::new(point_id, vector, payload)
    }
}

#[async_trait]
impl SemanticIndex for QdrantIndex {
    async fn ensure_ready(&self) -> Result<()> {
        for partition in DocType::all() {
            let name = self.collection_name(partition);
            if self.client.collection_exists(&name).await? {
                debug!("Collection {} already exists", name);
                continue;
            }

            info!(
                "Creating collection {} with dimension {}",
                name,
                self.embedder.dimension()
            );
            let vectors_config =
                VectorParamsBuilder::new(self.embedder.dimension() as u64, Distance::Cosine);
            self.client
                .create_collection(CreateCollectionBuilder::new(&name).vectors_config(vectors_config))
                .await?;
        }
        Ok(())
    }

    async fn count(&self, partition: DocType) -> Result<usize> {
        let name = self.collection_name(partition);
        if !self.client.collection_exists(&name).await? {
            return Ok(0);
        }
        let info = self.client.collection_info(&name).await?;
        Ok(info
            .result
            .map(|r| r.points_count.unwrap_or(0) as usize)
            .unwrap_or(0))
    }

    async fn upsert(&self, partition: DocType, doc: IndexDocument) -> Result<()> {
        let vectors = self.embedder.embed(vec![doc.text.clone()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;
        let point = self.point_struct(&doc, vector);

        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection_name(partition), vec![point]))
            .await?;
        debug!("Upserted document {} into {} partition", doc.id, partition);
        Ok(())
    }

    async fn bulk_index(&self, partition: DocType, docs: Vec<IndexDocument>) -> Result<usize> {
        let existing = self.count(partition).await?;
        if existing > 0 {
            info!(
                "Partition {} already populated ({} docs), skipping bulk index",
                partition, existing
            );
            return Ok(existing);
        }

        let total = docs.len();
        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;

        let points: Vec<PointStruct> = docs
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| self.point_struct(doc, vector))
            .collect();

        let name = self.collection_name(partition);
        for (i, batch) in points.chunks(UPSERT_BATCH_SIZE).enumerate() {
            self.client
                .upsert_points(UpsertPointsBuilder::new(&name, batch.to_vec()))
                .await?;
            info!(
                "Indexed {} {}/{}",
                partition,
                (i * UPSERT_BATCH_SIZE + batch.len()).min(total),
                total
            );
        }
        Ok(total)
    }

    async fn query(&self, partition: DocType, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.count(partition).await? == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(vec![text.to_string()]).await?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection_name(partition), query_vector, k as u64)
                    .with_payload(true),
            )
            .await?;

        let results = response
            .result
            .into_iter()
            .map(|point| {
                let payload: Map<String, Value> = point
                    .payload
                    .into_iter()
                    .map(|(key, value)| (key, json_from_qdrant_value(value)))
                    .collect();

                let metadata = payload
                    .get("metadata")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let title = metadata
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                SearchResult {
                    id: payload
                        .get("document_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    doc_type: partition,
                    title,
                    snippet: payload
                        .get("snippet")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: round_score(point.score.clamp(0.0, 1.0)),
                    metadata,
                }
            })
            .collect();

        Ok(results)
    }
}

/// Convert serde_json value to Qdrant value
fn json_to_qdrant_value(value: Value) -> QdrantValue {
    use qdrant_client::qdrant::value::Kind;

    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(qdrant_client::qdrant::ListValue {
            values: items.into_iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(qdrant_client::qdrant::Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant_value(v)))
                .collect(),
        }),
    };

    QdrantValue { kind: Some(kind) }
}

/// Convert Qdrant value to serde_json value
fn json_from_qdrant_value(value: QdrantValue) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(json_from_qdrant_value).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_qdrant_roundtrip() {
        let original = json!({
            "title": "Cache reset",
            "tier": 3,
            "score": 0.5,
            "tags": ["cache", "sync"],
            "nested": {"module": "Billing"}
        });

        let roundtripped = json_from_qdrant_value(json_to_qdrant_value(original.clone()));
        assert_eq!(roundtripped, original);
    }

    #[test]
    fn test_point_ids_are_stable() {
        let a = Uuid::new_v5(&Uuid::NAMESPACE_OID, "KB-SYN-0001".as_bytes());
        let b = Uuid::new_v5(&Uuid::NAMESPACE_OID, "KB-SYN-0001".as_bytes());
        assert_eq!(a, b);
    }
}
