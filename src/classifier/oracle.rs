//! LLM backends used for aspect classification.
//!
//! Two chat APIs are supported:
//! - Ollama's native `/api/chat` endpoint (local models)
//! - OpenAI-compatible `/chat/completions` endpoints (DeepSeek and friends)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by an [`Oracle`].
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to LLM endpoint at {0}")]
    Connect(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    #[error("API key variable {0} is not set")]
    MissingApiKey(String),

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// A text-completion collaborator: takes instructions and a prompt, returns
/// the raw model output.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, OracleError>;

    /// Model name, for logs and report metadata.
    fn model(&self) -> &str;
}

/// Connection settings shared by both backends.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn pair(system: &str, prompt: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ]
    }
}

fn build_client(timeout_seconds: u64) -> Result<reqwest::Client, OracleError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| OracleError::Client(e.to_string()))
}

fn map_send_error(e: reqwest::Error, settings: &OracleSettings) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout(settings.timeout_seconds)
    } else if e.is_connect() {
        OracleError::Connect(settings.base_url.clone())
    } else {
        OracleError::Request(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OracleError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(OracleError::Api { status, body })
}

// === Ollama ===

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Oracle backed by a local Ollama server.
pub struct OllamaOracle {
    settings: OracleSettings,
    http_client: reqwest::Client,
}

impl OllamaOracle {
    pub fn new(settings: OracleSettings) -> Result<Self, OracleError> {
        info!(
            "Using Ollama model {} at {}",
            settings.model, settings.base_url
        );
        let http_client = build_client(settings.timeout_seconds)?;
        Ok(Self {
            settings,
            http_client,
        })
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/api/chat", self.settings.base_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.settings.model.clone(),
            messages: ChatMessage::pair(system, prompt),
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.settings))?;
        let response = check_status(response).await?;

        let chat: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        debug!("Ollama returned {} chars", chat.message.content.len());
        Ok(chat.message.content)
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

// === OpenAI-compatible ===

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Oracle backed by an OpenAI-compatible chat completions API.
pub struct OpenAiOracle {
    settings: OracleSettings,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiOracle {
    pub fn new(settings: OracleSettings, api_key: String) -> Result<Self, OracleError> {
        info!(
            "Using OpenAI-compatible model {} at {}",
            settings.model, settings.base_url
        );
        let http_client = build_client(settings.timeout_seconds)?;
        Ok(Self {
            settings,
            api_key,
            http_client,
        })
    }

    /// Build from an API key held in the environment variable `key_env`.
    pub fn from_env(settings: OracleSettings, key_env: &str) -> Result<Self, OracleError> {
        let api_key = std::env::var(key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey(key_env.to_string()))?;
        Self::new(settings, api_key)
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: ChatMessage::pair(system, prompt),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.settings))?;
        let response = check_status(response).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OracleError::Parse("response contained no choices".to_string()))
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> OracleSettings {
        OracleSettings {
            base_url: server.uri(),
            model: "test-model".to_string(),
            temperature: 0.2,
            max_tokens: Some(256),
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_ollama_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "stream": false,
                "options": {"num_predict": 256}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "test-model",
                "message": {"role": "assistant", "content": "{\"ok\": true}"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oracle = OllamaOracle::new(settings(&server)).unwrap();
        let out = oracle.complete("sys", "hello").await.unwrap();
        assert_eq!(out, "{\"ok\": true}");
        assert_eq!(oracle.model(), "test-model");
    }

    #[tokio::test]
    async fn test_ollama_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let oracle = OllamaOracle::new(settings(&server)).unwrap();
        let err = oracle.complete("sys", "hello").await.unwrap_err();
        match err {
            OracleError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_openai_complete_sends_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"model": "test-model", "max_tokens": 256})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": "answer"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oracle = OpenAiOracle::new(settings(&server), "secret".to_string()).unwrap();
        assert_eq!(oracle.complete("sys", "q").await.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_openai_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let oracle = OpenAiOracle::new(settings(&server), "k".to_string()).unwrap();
        let err = oracle.complete("sys", "q").await.unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn test_missing_api_key() {
        let result = OpenAiOracle::from_env(
            crate::config::Config::default().oracle_settings(),
            "REVIEWLENS_TEST_KEY_THAT_IS_NEVER_SET",
        );
        assert!(matches!(result, Err(OracleError::MissingApiKey(_))));
    }
}
