//! Chat-completion generator
//!
//! The answer synthesis step is an opaque capability: a prompt and a system
//! role go in, answer text comes out. `ChatCompletionClient` speaks the
//! OpenAI-compatible `/chat/completions` protocol.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Produces answer text from an assembled prompt
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `prompt` under `system_role` with the named model
    async fn complete(&self, prompt: &str, system_role: &str, model: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat-completion client
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl ChatCompletionClient {
    /// Create a new client
    pub fn new(config: &LlmConfig, api_key: String, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry,
        })
    }

    async fn call(&self, prompt: &str, system_role: &str, model: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_role,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::unavailable("llm", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status("llm", status, &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_body_error("llm", e))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::malformed("llm", "Empty response from LLM"))
    }
}

#[async_trait]
impl Generator for ChatCompletionClient {
    async fn complete(&self, prompt: &str, system_role: &str, model: &str) -> Result<String> {
        let result = self
            .retry
            .run("llm", || self.call(prompt, system_role, model))
            .await;

        metrics::record_backend_request("llm", result.is_ok());
        if let Ok(ref answer) = result {
            tracing::info!(model, answer_chars = answer.len(), "Completion received");
        }
        result
    }
}

/// Deterministic generator for local development.
///
/// Always cites the first passage so citation handling can be exercised
/// without an API key.
pub struct MockGenerator;

#[async_trait]
impl Generator for MockGenerator {
    async fn complete(&self, prompt: &str, _system_role: &str, model: &str) -> Result<String> {
        Ok(format!(
            "[mock:{}] Answer grounded in passage [1] ({} prompt chars).",
            model,
            prompt.chars().count()
        ))
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &LlmConfig, retry: RetryPolicy) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(ChatCompletionClient::new(config, key, retry)?))
        }
        "mock" => Ok(Arc::new(MockGenerator)),
        other => Err(AppError::Configuration {
            message: format!("Unknown llm provider: {}", other),
        }),
    }
}
