//! DocQA Common Library
//!
//! Shared code for the DocQA crates including:
//! - Error types and retry classification
//! - Configuration management
//! - Retry policy for external calls
//! - Embedding and chat-completion clients
//! - Database connection pool
//! - Metrics and tracing bootstrap

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retry;
pub mod telemetry;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::Generator;
pub use retry::RetryPolicy;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
