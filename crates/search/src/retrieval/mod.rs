//! Hybrid retrieval primitives
//!
//! Two complementary backends produce ranked candidate lists for a query:
//! - Vector search (semantic similarity via embeddings)
//! - Lexical search (BM25-style token overlap)
//!
//! Their raw scores live on incomparable scales, so downstream stages only
//! rely on rank order (see [`fusion`]).

mod bm25;
mod elasticsearch;
pub mod fusion;
mod vector;

pub use bm25::PgLexicalIndex;
pub use elasticsearch::ElasticsearchIndex;
pub use fusion::{CandidateFuser, FusedCandidate, FusedSet, FusionPolicy, RrfParams};
pub use vector::PgVectorIndex;

use docqa_common::config::{LexicalBackend, LexicalConfig, VectorConfig};
use docqa_common::db::DbPool;
use docqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A retrieved piece of evidence.
///
/// Identity is the exact `(text, source)` pair: equal text from two sources
/// is two passages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passage {
    /// Passage content
    pub text: String,

    /// Where the passage came from (file name, URL, ...)
    pub source: String,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Which retrieval backend produced a candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Dense vector similarity search
    Vector,
    /// Sparse lexical (BM25) search
    Lexical,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Vector => "vector",
            Backend::Lexical => "lexical",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a candidate in one backend's list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OriginRank {
    pub backend: Backend,
    /// 1-based rank
    pub rank: usize,
}

/// A passage with its backend-native score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub passage: Passage,
    /// Raw backend score; only comparable within the same list
    pub score: f32,
    pub origin: OriginRank,
}

/// Ordered results of one backend for one query
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    backend: Backend,
    candidates: Vec<ScoredCandidate>,
}

impl RankedList {
    /// An empty list for `backend`
    pub fn empty(backend: Backend) -> Self {
        Self {
            backend,
            candidates: Vec::new(),
        }
    }

    /// Build a list from hits already in backend rank order
    pub fn from_hits(backend: Backend, hits: impl IntoIterator<Item = (Passage, f32)>) -> Self {
        let candidates = hits
            .into_iter()
            .enumerate()
            .map(|(i, (passage, score))| ScoredCandidate {
                passage,
                score,
                origin: OriginRank { backend, rank: i + 1 },
            })
            .collect();

        Self { backend, candidates }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn candidates(&self) -> &[ScoredCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.candidates.iter()
    }

    /// Keep candidates scoring strictly above `threshold`, re-ranked 1..n
    pub fn above_threshold(self, threshold: f32) -> Self {
        let backend = self.backend;
        Self::from_hits(
            backend,
            self.candidates
                .into_iter()
                .filter(|c| c.score > threshold)
                .map(|c| (c.passage, c.score)),
        )
    }
}

/// Nearest-neighbor search over passage embeddings
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` passages ordered by similarity to `embedding`
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<RankedList>;

    /// Backend name for logs and errors
    fn name(&self) -> &str;
}

/// Keyword (match-query) search over passage text
#[async_trait::async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Return up to `limit` passages ordered by lexical relevance to `query`
    async fn search(&self, query: &str, limit: usize) -> Result<RankedList>;

    /// Backend name for logs and errors
    fn name(&self) -> &str;
}

/// Create the lexical index selected by `lexical.backend`
pub fn create_lexical_index(
    db: Arc<DbPool>,
    vector: &VectorConfig,
    lexical: &LexicalConfig,
) -> Result<Arc<dyn LexicalIndex>> {
    match lexical.backend {
        LexicalBackend::Postgres => Ok(Arc::new(PgLexicalIndex::new(db, vector, lexical)?)),
        LexicalBackend::Elasticsearch => Ok(Arc::new(ElasticsearchIndex::new(lexical)?)),
    }
}

/// Reject table names that cannot be safely interpolated into SQL
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(AppError::Configuration {
            message: format!("Invalid SQL identifier: {:?}", name),
        })
    }
}
