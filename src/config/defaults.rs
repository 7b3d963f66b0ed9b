//! Default values for configuration

use std::path::PathBuf;

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default prefix for Qdrant collection names (one collection per partition)
pub fn default_collection_prefix() -> String {
    "supportmind".to_string()
}

/// Default path to the corpus export (JSON workbook dump)
pub fn default_data_path() -> PathBuf {
    std::env::var("SUPPORTMIND_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/supportmind_corpus.json"))
}

/// Default index backend ("memory" needs no external service)
pub fn default_index_backend() -> String {
    "memory".to_string()
}

/// Default embedding backend ("hash" is deterministic and fully offline)
pub fn default_embedding_backend() -> String {
    "hash".to_string()
}

/// Default embedding backend URL (for the "http" backend)
pub fn default_embedding_backend_url() -> String {
    std::env::var("SUPPORTMIND_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (must match model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default number of fused results per question
pub fn default_retrieval_top_k() -> usize {
    5
}

/// Default similarity threshold below which a case counts as a knowledge gap
pub fn default_similarity_threshold() -> f32 {
    0.35
}

/// Default maximum characters kept as a result snippet
pub fn default_snippet_max_chars() -> usize {
    500
}

/// Default maximum characters of document text sent to the embedder
pub fn default_document_max_chars() -> usize {
    8000
}

/// Default maximum characters of the gap-detection query text
pub fn default_gap_query_max_chars() -> usize {
    1000
}

/// Default prefix for generated KB article IDs
pub fn default_kb_id_prefix() -> String {
    "KB-SYN".to_string()
}

/// Default generation backend ("openai" degrades to the extractive
/// fallback when no API key is present)
pub fn default_generation_backend() -> String {
    "openai".to_string()
}

/// Default generation model
pub fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default generation API base URL
pub fn default_generation_base_url() -> String {
    std::env::var("SUPPORTMIND_GENERATION_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com".to_string())
}

/// Default environment variable holding the generation API key
pub fn default_generation_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default maximum completion tokens
pub fn default_generation_max_tokens() -> u32 {
    4000
}

/// Default sampling temperature
pub fn default_generation_temperature() -> f32 {
    0.2
}
