//! Embedding and completion providers
//!
//! The semantic and remote tiers talk to external models through these two
//! traits. HTTP implementations speak the OpenAI-compatible `/embeddings`
//! and `/chat/completions` APIs; every request carries a client-level
//! timeout, and an elapsed timeout surfaces as [`Error::ProviderTimeout`].

use async_trait::async_trait;
use rodalex_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Text embedding service
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Text completion service
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a prompt
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;

    /// Model identifier
    fn model_name(&self) -> &str;
}

pub type SharedEmbeddings = Arc<dyn EmbeddingProvider>;
pub type SharedCompletions = Arc<dyn CompletionProvider>;

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ProviderConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            model: model.into(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .build()
            .map_err(|e| Error::provider(format!("Failed to create HTTP client: {e}")))
    }

    fn map_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::ProviderTimeout(self.timeout_ms)
        } else {
            Error::provider(err.to_string())
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    3_000
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `/embeddings` client
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    config: ProviderConfig,
    api_key: Option<String>,
}

impl OpenAiEmbeddings {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.client()?,
            api_key: config.api_key(),
            config,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self
            .client
            .post(self.config.endpoint("embeddings"))
            .json(&serde_json::json!({
                "model": self.config.model,
                "input": text,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.config.map_error(e))?
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| self.config.map_error(e))?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::provider("No embedding in response"))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// `/chat/completions` client
pub struct OpenAiCompletions {
    client: reqwest::Client,
    config: ProviderConfig,
    api_key: Option<String>,
}

impl OpenAiCompletions {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.client()?,
            api_key: config.api_key(),
            config,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let mut request = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .json(&serde_json::json!({
                "model": self.config.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": temperature,
                "max_tokens": max_tokens,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.config.map_error(e))?
            .json::<ChatResponse>()
            .await
            .map_err(|e| self.config.map_error(e))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::provider("No completion in response"))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Placeholder for an unconfigured embedding service; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEmbeddings;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::provider("embedding provider is not configured"))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Placeholder for an unconfigured completion service; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCompletions;

#[async_trait]
impl CompletionProvider for DisabledCompletions {
    async fn complete(&self, _prompt: &str, _temperature: f32, _max_tokens: u32) -> Result<String> {
        Err(Error::provider("completion provider is not configured"))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: ProviderConfig = serde_yaml::from_str("model: text-embedding-3-small").unwrap();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.timeout(), Duration::from_millis(3_000));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let mut config = ProviderConfig::new("m");
        config.base_url = "http://localhost:8080/v1/".to_string();
        assert_eq!(config.endpoint("embeddings"), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_response_parsing() {
        let embedding: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[0.1,0.2],"index":0}],"model":"m"}"#)
                .unwrap();
        assert_eq!(embedding.data[0].embedding, vec![0.1, 0.2]);

        let chat: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"SI"}}]}"#,
        )
        .unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("SI"));
    }

    #[tokio::test]
    async fn test_disabled_providers_fail() {
        assert!(DisabledEmbeddings.embed("multa").await.is_err());
        assert!(DisabledCompletions.complete("multa", 0.0, 50).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_provider_error() {
        let mut config = ProviderConfig::new("m");
        // Port 9 (discard) on localhost is not expected to serve HTTP
        config.base_url = "http://127.0.0.1:9".to_string();
        config.timeout_ms = 500;
        let provider = OpenAiEmbeddings::new(config).unwrap();
        let err = provider.embed("multa").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_) | Error::ProviderTimeout(_)));
    }
}
