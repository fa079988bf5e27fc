//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible APIs (text-embedding-3-small, text-embedding-ada-002)
//! - A deterministic mock for local development and tests

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: Vec<String>,
    model: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

/// Known output sizes for OpenAI embedding models
fn model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(config: &EmbeddingConfig, api_key: String, retry: RetryPolicy) -> Result<Self> {
        let dimension = model_dimension(&config.model).unwrap_or(config.dimension);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            retry,
        })
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let result = self
            .retry
            .run("embedding", || self.make_request(texts))
            .await;

        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            &self.model,
            texts.len(),
            result.is_ok(),
        );
        result
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        // Newlines degrade embedding quality for these models
        let request = OpenAIRequest {
            input: texts.iter().map(|t| t.replace('\n', " ")).collect(),
            model: &self.model,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::unavailable("embedding", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status("embedding", status, &body));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_body_error("embedding", e))?;

        if result.data.len() != texts.len() {
            return Err(AppError::malformed(
                "embedding",
                format!("expected {} embeddings, got {}", texts.len(), result.data.len()),
            ));
        }

        let embeddings: Vec<Vec<f32>> = result.data.into_iter().map(|e| e.embedding).collect();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(AppError::malformed(
                "embedding",
                format!("expected dimension {}, got {}", self.dimension, bad.len()),
            ));
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::malformed("embedding", "Empty response"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for development and testing.
///
/// Vectors are unit-length and seeded from the text, so equal texts embed
/// identically.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let raw: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
        Ok(raw.into_iter().map(|x| x / norm).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig, retry: RetryPolicy) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(config, key, retry)?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::test_support::stub_server;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed("hybrid search").await.unwrap();
        let b = embedder.embed("hybrid search").await.unwrap();
        let c = embedder.embed("something else").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    fn embedder_for(base: String, retry: RetryPolicy) -> OpenAIEmbedder {
        let config = EmbeddingConfig {
            api_base: Some(base),
            dimension: 3,
            model: "custom-embedding".to_string(),
            ..EmbeddingConfig::default()
        };
        OpenAIEmbedder::new(&config, "sk-test".to_string(), retry).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let (base, hits) = stub_server(400, r#"{"error": "input too long"}"#).await;
        let embedder = embedder_for(base, RetryPolicy::immediate(3));

        let err = embedder.embed("hybrid search").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UpstreamError);
        assert!(!err.is_retryable());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_throttling_is_retried() {
        let (base, hits) = stub_server(429, "slow down").await;
        let embedder = embedder_for(base, RetryPolicy::immediate(2));

        let err = embedder.embed("hybrid search").await.unwrap_err();
        assert!(matches!(err, AppError::BackendUnavailable { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embedding_parsed() {
        let (base, _) = stub_server(200, r#"{"data": [{"embedding": [0.1, 0.2, 0.3]}]}"#).await;
        let embedder = embedder_for(base, RetryPolicy::none());

        assert_eq!(embedder.embed("hybrid search").await.unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = EmbeddingConfig::default();
        let result = create_embedder(&config, RetryPolicy::none());
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config, RetryPolicy::none()).is_err());
    }

    #[test]
    fn test_known_model_dimension_wins() {
        let config = EmbeddingConfig {
            model: "text-embedding-3-large".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAIEmbedder::new(&config, "sk-test".to_string(), RetryPolicy::none()).unwrap();
        assert_eq!(embedder.dimension(), 3072);
    }
}
