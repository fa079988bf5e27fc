//! Configuration management for DocQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::retry::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (pgvector + Postgres full-text)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Vector index configuration
    #[serde(default)]
    pub vector: VectorConfig,

    /// Lexical index configuration
    #[serde(default)]
    pub lexical: LexicalConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Cross-encoder rerank service configuration
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Chat-completion service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval and fusion knobs
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Retry policy for every backend call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Similarity convention of the vector index
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity, `1 - cosine distance`
    Cosine,
    /// Raw inner product (normalized embeddings)
    InnerProduct,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    /// Table holding passages and their embeddings
    #[serde(default = "default_passage_table")]
    pub table: String,

    /// Similarity metric used for scoring
    #[serde(default = "default_metric")]
    pub metric: SimilarityMetric,
}

/// Which engine serves lexical (BM25) search
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LexicalBackend {
    /// PostgreSQL full-text search on the passage table
    Postgres,
    /// Elasticsearch `match` query
    Elasticsearch,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LexicalConfig {
    #[serde(default = "default_lexical_backend")]
    pub backend: LexicalBackend,

    /// Elasticsearch base URL
    #[serde(default = "default_elasticsearch_url")]
    pub elasticsearch_url: String,

    /// Elasticsearch index name
    #[serde(default = "default_elasticsearch_index")]
    pub index: String,

    /// Document field holding passage text
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Document field holding the passage source
    #[serde(default = "default_source_field")]
    pub source_field: String,

    /// PostgreSQL text search configuration (regconfig)
    #[serde(default = "default_ts_config")]
    pub ts_config: String,

    /// Request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    /// Rerank provider: cohere, mock
    #[serde(default = "default_rerank_provider")]
    pub provider: String,

    /// API key for the rerank service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_rerank_api_base")]
    pub api_base: String,

    /// Cross-encoder model
    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Passages kept after reranking
    #[serde(default = "default_rerank_top_n")]
    pub top_n: usize,

    /// Request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Generation provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat-completion endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Default model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// System role sent with every completion
    #[serde(default = "default_system_role")]
    pub system_role: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Fusion policy selector
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Union with first-seen de-duplication
    Union,
    /// Weighted reciprocal rank fusion
    Rrf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results requested from the vector index
    #[serde(default = "default_vector_limit")]
    pub vector_limit: usize,

    /// Vector hits must score strictly above this value
    #[serde(default = "default_vector_threshold")]
    pub vector_threshold: f32,

    /// Results requested from the lexical index
    #[serde(default = "default_lexical_limit")]
    pub lexical_limit: usize,

    #[serde(default = "default_fusion_mode")]
    pub fusion: FusionMode,

    /// RRF weight for the vector list
    #[serde(default = "default_fusion_weight")]
    pub vector_weight: f64,

    /// RRF weight for the lexical list
    #[serde(default = "default_fusion_weight")]
    pub lexical_weight: f64,

    /// RRF rank-discounting constant
    #[serde(default = "default_rrf_constant")]
    pub rrf_constant: f64,

    /// Candidates kept by RRF fusion
    #[serde(default = "default_fusion_top_k")]
    pub fusion_top_k: usize,

    /// Per-call timeout for backend searches, in seconds
    #[serde(default = "default_backend_timeout")]
    pub search_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts per backend call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Backoff ceiling in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name recorded on every request span
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_database_url() -> String { "postgres://localhost/docqa".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_passage_table() -> String { "passages".to_string() }
fn default_metric() -> SimilarityMetric { SimilarityMetric::InnerProduct }
fn default_lexical_backend() -> LexicalBackend { LexicalBackend::Postgres }
fn default_elasticsearch_url() -> String { "http://localhost:9200".to_string() }
fn default_elasticsearch_index() -> String { "docs_qa".to_string() }
fn default_text_field() -> String { "content".to_string() }
fn default_source_field() -> String { "source".to_string() }
fn default_ts_config() -> String { "english".to_string() }
fn default_backend_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_rerank_provider() -> String { "cohere".to_string() }
fn default_rerank_api_base() -> String { "https://api.cohere.ai/v1".to_string() }
fn default_rerank_model() -> String { "rerank-multilingual-v2.0".to_string() }
fn default_rerank_top_n() -> usize { 5 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_system_role() -> String {
    "You are a helpful assistant. Answer the question using only the numbered text passages provided, \
     and cite the passage numbers you relied on."
        .to_string()
}
fn default_max_tokens() -> usize { 1024 }
fn default_llm_timeout() -> u64 { 60 }
fn default_vector_limit() -> usize { 5 }
fn default_vector_threshold() -> f32 { 0.5 }
fn default_lexical_limit() -> usize { 5 }
fn default_fusion_mode() -> FusionMode { FusionMode::Union }
fn default_fusion_weight() -> f64 { 0.5 }
fn default_rrf_constant() -> f64 { 60.0 }
fn default_fusion_top_k() -> usize { 10 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_delay_ms() -> u64 { 1000 }
fn default_max_delay_secs() -> u64 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docqa".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // .env is optional; real environment variables win
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__FUSION=rrf
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl RetrievalConfig {
    /// Search timeout as Duration
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

impl RetryConfig {
    /// Build the runtime retry policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            ..RetryPolicy::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            table: default_passage_table(),
            metric: default_metric(),
        }
    }
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            backend: default_lexical_backend(),
            elasticsearch_url: default_elasticsearch_url(),
            index: default_elasticsearch_index(),
            text_field: default_text_field(),
            source_field: default_source_field(),
            ts_config: default_ts_config(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_rerank_provider(),
            api_key: None,
            api_base: default_rerank_api_base(),
            model: default_rerank_model(),
            top_n: default_rerank_top_n(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            system_role: default_system_role(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_limit: default_vector_limit(),
            vector_threshold: default_vector_threshold(),
            lexical_limit: default_lexical_limit(),
            fusion: default_fusion_mode(),
            vector_weight: default_fusion_weight(),
            lexical_weight: default_fusion_weight(),
            rrf_constant: default_rrf_constant(),
            fusion_top_k: default_fusion_top_k(),
            search_timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            vector: VectorConfig::default(),
            lexical: LexicalConfig::default(),
            embedding: EmbeddingConfig::default(),
            rerank: RerankConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            retry: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rerank.top_n, 5);
        assert_eq!(config.rerank.model, "rerank-multilingual-v2.0");
        assert_eq!(config.retrieval.fusion, FusionMode::Union);
        assert_eq!(config.retrieval.rrf_constant, 60.0);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("retrieval.fusion", "rrf")
            .and_then(|b| b.set_override("retrieval.vector_weight", 0.7))
            .and_then(|b| b.set_override("lexical.backend", "elasticsearch"))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .expect("config should deserialize");

        assert_eq!(config.retrieval.fusion, FusionMode::Rrf);
        assert_eq!(config.retrieval.vector_weight, 0.7);
        assert_eq!(config.retrieval.lexical_weight, 0.5);
        assert_eq!(config.lexical.backend, LexicalBackend::Elasticsearch);
        assert_eq!(config.lexical.index, "docs_qa");
        assert_eq!(config.server.port, 8080);
    }
}
