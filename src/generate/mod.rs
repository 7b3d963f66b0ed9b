//! Text generation capability
//!
//! Generation is optional: callers hold an `Option` over the trait and fall
//! back to deterministic extraction/templating when it is absent. Absence of
//! credentials is not an error.

mod openai;

pub use openai::*;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Trait for text-completion providers
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete a prompt into free text
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Complete a prompt with JSON-shaped output requested
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a generator from configuration. Returns `None` when no backend is
/// configured or no API key is available; callers must degrade gracefully.
pub fn create_generator(config: &GenerationConfig) -> Result<Option<Arc<dyn TextGenerator>>> {
    match config.backend.as_str() {
        "none" => Ok(None),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
            if api_key.is_empty() {
                info!(
                    "No API key in ${}; generation disabled, using deterministic fallbacks",
                    config.api_key_env
                );
                return Ok(None);
            }
            Ok(Some(Arc::new(OpenAiGenerator::new(config, api_key)?)))
        }
        other => Err(Error::Config(format!("Unknown generation backend: {}", other))),
    }
}
