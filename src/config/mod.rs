//! Configuration management for supportmind
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the corpus export (JSON workbook dump)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Semantic index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Generative backend configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Semantic index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index backend: "memory" or "qdrant"
    #[serde(default = "default_index_backend")]
    pub backend: String,

    /// Qdrant connection URL (for the "qdrant" backend)
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Prefix for Qdrant collection names
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend: "hash", "http", or "local" (with the local-embed feature)
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Embedding backend URL (for the "http" backend)
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of fused results per question
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,

    /// Similarity threshold for gap detection
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum characters kept as a result snippet
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,

    /// Maximum characters of document text sent to the embedder
    #[serde(default = "default_document_max_chars")]
    pub document_max_chars: usize,

    /// Maximum characters of the gap-detection query text
    #[serde(default = "default_gap_query_max_chars")]
    pub gap_query_max_chars: usize,

    /// Prefix for generated KB article IDs
    #[serde(default = "default_kb_id_prefix")]
    pub kb_id_prefix: String,
}

/// Generative backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generation backend: "openai" or "none"
    #[serde(default = "default_generation_backend")]
    pub backend: String,

    /// Model name
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// API base URL
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_generation_api_key_env")]
    pub api_key_env: String,

    /// Maximum completion tokens
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,
}

/// Internal paths
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// SQLite ledger database file
    pub db_file: PathBuf,
    /// Config file location
    pub config_file: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            qdrant_url: default_qdrant_url(),
            collection_prefix: default_collection_prefix(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            backend_url: default_embedding_backend_url(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            similarity_threshold: default_similarity_threshold(),
            snippet_max_chars: default_snippet_max_chars(),
            document_max_chars: default_document_max_chars(),
            gap_query_max_chars: default_gap_query_max_chars(),
            kb_id_prefix: default_kb_id_prefix(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_generation_backend(),
            model: default_generation_model(),
            base_url: default_generation_base_url(),
            api_key_env: default_generation_api_key_env(),
            max_tokens: default_generation_max_tokens(),
            temperature: default_generation_temperature(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_file: data_dir.join("ledger.db"),
            config_file: default_config_dir().join("config.toml"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Default configuration directory (~/.config/supportmind)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("supportmind")
}

/// Default data directory (~/.local/share/supportmind)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("supportmind")
}

impl Config {
    /// Load configuration from the given path, or the default location.
    /// Missing files yield the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_config_dir().join("config.toml"));

        let mut config = if config_file.exists() {
            debug!("Loading config from {:?}", config_file);
            let content = std::fs::read_to_string(&config_file)?;
            toml::from_str::<Config>(&content)?
        } else {
            debug!("No config file at {:?}, using defaults", config_file);
            Config::default()
        };

        config.paths = PathsConfig {
            db_file: default_data_dir().join("ledger.db"),
            config_file,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to its config file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Wrote config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        match self.index.backend.as_str() {
            "memory" | "qdrant" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unknown index backend '{}'; expected 'memory' or 'qdrant'",
                    other
                )))
            }
        }
        match self.embedding.backend.as_str() {
            "hash" | "http" | "local" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unknown embedding backend '{}'; expected 'hash', 'http', or 'local'",
                    other
                )))
            }
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("Embedding dimension must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(Error::Config(format!(
                "Similarity threshold {} out of range [0, 1]",
                self.retrieval.similarity_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.similarity_threshold, 0.35);
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.embedding.dimension, config.embedding.dimension);
        assert_eq!(parsed.retrieval.kb_id_prefix, "KB-SYN");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[retrieval]\ntop_k = 8\n").unwrap();
        assert_eq!(parsed.retrieval.top_k, 8);
        assert_eq!(parsed.retrieval.similarity_threshold, 0.35);
        assert_eq!(parsed.index.backend, "memory");
    }

    #[test]
    fn test_validate_rejects_bad_backend() {
        let mut config = Config::default();
        config.index.backend = "chroma".to_string();
        assert!(config.validate().is_err());
    }
}
