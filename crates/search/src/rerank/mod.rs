//! Cross-encoder reranking
//!
//! The fused candidate set is re-scored against the query by a
//! `RerankProvider`. Providers only round-trip document text, so the
//! `Reranker` re-attaches each hit to its original `Passage`, either by the
//! returned document index or by text lookup.
//!
//! Known limitation: with text lookup, two passages sharing identical text
//! but different sources resolve to the first one submitted.

mod cohere;

pub use cohere::CohereReranker;

use crate::retrieval::Passage;
use docqa_common::config::RerankConfig;
use docqa_common::errors::{AppError, Result};
use docqa_common::metrics;
use docqa_common::retry::RetryPolicy;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How a provider identifies the document it scored
#[derive(Debug, Clone, PartialEq)]
pub enum RerankTarget {
    /// Position in the submitted document list
    Index(usize),
    /// Echoed document text
    Text(String),
}

/// One scored document returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct RerankHit {
    pub target: RerankTarget,
    pub relevance_score: f32,
}

/// Scores (query, document) pairs for relevance
#[async_trait::async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score `documents` against `query`, returning at most `top_n` hits
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankHit>>;

    /// Provider name for logs and errors
    fn name(&self) -> &str;
}

/// A passage with its cross-encoder relevance score
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RerankedPassage {
    pub passage: Passage,
    pub relevance_score: f32,
}

/// Bounded, provider-backed reranking stage
#[derive(Clone)]
pub struct Reranker {
    provider: Arc<dyn RerankProvider>,
    retry: RetryPolicy,
}

impl Reranker {
    pub fn new(provider: Arc<dyn RerankProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Rerank `candidates` and keep the best `top_n`.
    ///
    /// Output is sorted by descending relevance (equal scores keep provider
    /// order) and every passage is one of `candidates`. Transport failures
    /// are retried under the policy; malformed provider output fails fast.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[Passage],
        top_n: usize,
    ) -> Result<Vec<RerankedPassage>> {
        if top_n == 0 {
            return Err(AppError::validation("rerank.top_n", "top_n must be greater than zero"));
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = candidates.iter().map(|p| p.text.clone()).collect();

        let result = self
            .retry
            .run("rerank", || self.provider.rerank(query, &documents, top_n))
            .await;
        metrics::record_backend_request(self.provider.name(), result.is_ok());

        let reranked = self.attach(candidates, result?, top_n)?;
        for hit in &reranked {
            tracing::debug!(
                score = hit.relevance_score,
                source = %hit.passage.source,
                text = %hit.passage.text,
                "Reranked passage"
            );
        }
        Ok(reranked)
    }

    fn attach(&self, candidates: &[Passage], hits: Vec<RerankHit>, top_n: usize) -> Result<Vec<RerankedPassage>> {
        let mut by_text: HashMap<&str, usize> = HashMap::new();
        for (i, passage) in candidates.iter().enumerate() {
            by_text.entry(passage.text.as_str()).or_insert(i);
        }

        let mut seen = HashSet::new();
        let mut reranked = Vec::with_capacity(hits.len().min(top_n));

        for hit in hits {
            if !hit.relevance_score.is_finite() {
                return Err(AppError::malformed(
                    self.provider.name(),
                    format!("non-finite relevance score {}", hit.relevance_score),
                ));
            }

            let index = match &hit.target {
                RerankTarget::Index(i) if *i < candidates.len() => *i,
                RerankTarget::Index(i) => {
                    return Err(AppError::malformed(
                        self.provider.name(),
                        format!("document index {} out of range for {} candidates", i, candidates.len()),
                    ));
                }
                RerankTarget::Text(text) => *by_text.get(text.as_str()).ok_or_else(|| {
                    AppError::malformed(self.provider.name(), "provider returned an unknown document")
                })?,
            };

            if seen.insert(index) {
                reranked.push(RerankedPassage {
                    passage: candidates[index].clone(),
                    relevance_score: hit.relevance_score,
                });
            }
        }

        reranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        reranked.truncate(top_n);
        Ok(reranked)
    }
}

/// Token-overlap scorer for local development.
///
/// Scores each document by the fraction of query tokens it contains.
pub struct MockReranker;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait::async_trait]
impl RerankProvider for MockReranker {
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankHit>> {
        let query_tokens = tokens(query);
        let denom = query_tokens.len().max(1) as f32;

        let mut hits: Vec<RerankHit> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| RerankHit {
                target: RerankTarget::Index(i),
                relevance_score: tokens(doc).intersection(&query_tokens).count() as f32 / denom,
            })
            .collect();

        hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        hits.truncate(top_n);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "mock_rerank"
    }
}

/// Create a rerank provider based on configuration
pub fn create_rerank_provider(config: &RerankConfig) -> Result<Arc<dyn RerankProvider>> {
    match config.provider.as_str() {
        "cohere" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "rerank.api_key is required for the cohere provider".to_string(),
            })?;
            Ok(Arc::new(CohereReranker::new(config, key)?))
        }
        "mock" => Ok(Arc::new(MockReranker)),
        other => Err(AppError::Configuration {
            message: format!("Unknown rerank provider: {}", other),
        }),
    }
}
