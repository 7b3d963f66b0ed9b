//! Semantic document index
//!
//! This module defines the per-category ("partition") semantic search
//! abstraction and its backends:
//! - Partition = one document category (KB articles, scripts, tickets)
//! - Bulk indexing is idempotent: a populated partition is never re-indexed
//! - Scores are similarity values in [0, 1]; 0 means no usable match

mod memory;
mod qdrant;

pub use memory::*;
pub use qdrant::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use unicode_segmentation::UnicodeSegmentation;

/// Document category; each category is an independent index partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    KbArticle,
    Script,
    Ticket,
}

impl DocType {
    /// All partitions in canonical query order (kb -> script -> ticket)
    pub fn all() -> [DocType; 3] {
        [DocType::KbArticle, DocType::Script, DocType::Ticket]
    }

    /// Collection name suffix for this partition
    pub fn collection_suffix(&self) -> &'static str {
        match self {
            DocType::KbArticle => "kb_articles",
            DocType::Script => "scripts",
            DocType::Ticket => "tickets",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocType::KbArticle => write!(f, "kb_article"),
            DocType::Script => write!(f, "script"),
            DocType::Ticket => write!(f, "ticket"),
        }
    }
}

impl FromStr for DocType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kb_article" => Ok(DocType::KbArticle),
            "script" => Ok(DocType::Script),
            "ticket" => Ok(DocType::Ticket),
            _ => Err(Error::Validation(format!("Unknown document type: {}", s))),
        }
    }
}

/// A document ready for indexing: embeddable text plus display metadata
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }
}

/// A ranked retrieval hit, produced per query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub doc_type: DocType,
    pub title: String,
    pub snippet: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// Contract for a per-partition semantic index
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Create any missing partitions
    async fn ensure_ready(&self) -> Result<()>;

    /// Number of documents currently held by a partition
    async fn count(&self, partition: DocType) -> Result<usize>;

    /// Insert or replace a single document
    async fn upsert(&self, partition: DocType, doc: IndexDocument) -> Result<()>;

    /// Index a document set into a partition. If the partition already holds
    /// documents this is a no-op returning the existing count, which guards
    /// against reprocessing the whole corpus on every restart.
    async fn bulk_index(&self, partition: DocType, docs: Vec<IndexDocument>) -> Result<usize>;

    /// Nearest-neighbor query. An empty partition yields no results.
    async fn query(&self, partition: DocType, text: &str, k: usize) -> Result<Vec<SearchResult>>;
}

/// Round a similarity score to 4 decimal places
pub fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

/// Truncate text to at most `max` grapheme clusters without splitting one
pub fn truncate_graphemes(text: &str, max: usize) -> &str {
    match text.grapheme_indices(true).nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Metadata map for a KB article document
pub fn kb_metadata(title: &str, module: &str, category: &str, source_type: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("title".to_string(), Value::String(truncate_graphemes(title, 500).to_string()));
    meta.insert("module".to_string(), Value::String(module.to_string()));
    meta.insert("category".to_string(), Value::String(category.to_string()));
    meta.insert("source_type".to_string(), Value::String(source_type.to_string()));
    meta.insert("doc_type".to_string(), Value::String(DocType::KbArticle.to_string()));
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_roundtrip() {
        for dt in DocType::all() {
            assert_eq!(dt.to_string().parse::<DocType>().unwrap(), dt);
        }
        assert!("spreadsheet".parse::<DocType>().is_err());
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123_456), 0.1235);
        assert_eq!(round_score(0.0), 0.0);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_truncate_graphemes() {
        assert_eq!(truncate_graphemes("hello", 3), "hel");
        assert_eq!(truncate_graphemes("hello", 10), "hello");
        // Multi-byte graphemes are never split
        assert_eq!(truncate_graphemes("héllo", 2), "hé");
    }

    #[test]
    fn test_kb_metadata_caps_title() {
        let long_title = "x".repeat(600);
        let meta = kb_metadata(&long_title, "Billing", "Cache", "generated");
        assert_eq!(meta.get("title").unwrap().as_str().unwrap().len(), 500);
        assert_eq!(meta.get("doc_type").unwrap().as_str().unwrap(), "kb_article");
    }
}
