//! OpenAI-compatible chat-completions client

use super::TextGenerator;
use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible chat-completions API
pub struct OpenAiGenerator {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retries: usize,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retries: 2,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join("/v1/chat/completions")
            .map_err(|e| Error::Config(format!("Invalid generation base URL: {}", e)))
    }

    async fn chat(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let url = self.endpoint()?;
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = self
                .client
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(&request);
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        let parsed: ChatResponse = ok.json().await?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .filter(|content| !content.is_empty())
                            .ok_or_else(|| {
                                Error::Generation("Completion response had no content".to_string())
                            });
                    }
                    Err(e) => last_err = Some(Error::Generation(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Generation(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Generation("Completion request failed".to_string())))
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.chat(system, user, false).await
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        self.chat(system, user, true).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> GenerationConfig {
        GenerationConfig {
            backend: "openai".to_string(),
            model: "test-model".to_string(),
            base_url: url.to_string(),
            api_key_env: "UNUSED".to_string(),
            max_tokens: 100,
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn test_complete_returns_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Reset the cache."}}]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&test_config(&server.uri()), "key".to_string()).unwrap();
        let answer = generator.complete("system", "question").await.unwrap();
        assert_eq!(answer, "Reset the cache.");
    }

    #[tokio::test]
    async fn test_complete_json_requests_json_object_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"title\": \"t\"}"}}]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&test_config(&server.uri()), "key".to_string()).unwrap();
        let raw = generator.complete_json("system", "question").await.unwrap();
        assert!(raw.contains("title"));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_as_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&test_config(&server.uri()), "key".to_string()).unwrap();
        let err = generator.complete("system", "question").await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}
