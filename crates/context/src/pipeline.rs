//! The DocQA orchestrator
//!
//! Each query runs four sequential stages:
//! RETRIEVE -> FUSE -> RERANK -> ASSEMBLE+GENERATE.
//!
//! RETRIEVE fans out to the vector and lexical indexes concurrently and
//! waits for both. Any stage failure ends the query with a single
//! `QueryFailed` error naming the stage; no partial answer is produced.

use crate::citations::{extract_citations, Citation};
use crate::prompt::{PromptAssembler, QaPrompt};
use chrono::{DateTime, Utc};
use docqa_common::config::AppConfig;
use docqa_common::errors::{AppError, Result};
use docqa_common::metrics::{self, StageTimer};
use docqa_common::retry::RetryPolicy;
use docqa_common::{Embedder, Generator};
use docqa_search::{
    CandidateFuser, FusedSet, FusionPolicy, LexicalIndex, RankedList, RerankProvider, RerankedPassage,
    Reranker, VectorIndex,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Pipeline stage names used in errors, logs and metrics
pub mod stage {
    pub const VALIDATE: &str = "validate";
    pub const RETRIEVE: &str = "retrieve";
    pub const FUSE: &str = "fuse";
    pub const RERANK: &str = "rerank";
    pub const GENERATE: &str = "generate";
}

/// Tunables for one orchestrator instance
#[derive(Debug, Clone)]
pub struct DocQaSettings {
    pub vector_limit: usize,
    /// Vector hits must score strictly above this
    pub vector_threshold: f32,
    pub lexical_limit: usize,
    pub rerank_top_n: usize,
    pub model: String,
    pub system_role: String,
    /// Upper bound on a single backend search attempt
    pub search_timeout: Duration,
}

impl Default for DocQaSettings {
    fn default() -> Self {
        Self {
            vector_limit: 5,
            vector_threshold: 0.5,
            lexical_limit: 5,
            rerank_top_n: 5,
            model: "gpt-3.5-turbo".to_string(),
            system_role: "You are a helpful assistant.".to_string(),
            search_timeout: Duration::from_secs(30),
        }
    }
}

impl DocQaSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            vector_limit: config.retrieval.vector_limit,
            vector_threshold: config.retrieval.vector_threshold,
            lexical_limit: config.retrieval.lexical_limit,
            rerank_top_n: config.rerank.top_n,
            model: config.llm.model.clone(),
            system_role: config.llm.system_role.clone(),
            search_timeout: config.retrieval.search_timeout(),
        }
    }
}

/// External capabilities the orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub lexical_index: Arc<dyn LexicalIndex>,
    pub rerank_provider: Arc<dyn RerankProvider>,
    pub generator: Arc<dyn Generator>,
}

/// Evidence selected for a query, before generation
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub vector: RankedList,
    pub lexical: RankedList,
    pub fused: FusedSet,
    pub reranked: Vec<RerankedPassage>,
}

/// A generated answer with its evidence
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    pub context_block: String,
    pub source_block: String,
    pub citations: Vec<Citation>,
    pub passages: Vec<RerankedPassage>,
    pub model: String,
    pub elapsed_ms: u64,
    pub answered_at: DateTime<Utc>,
}

/// Hybrid retrieval question answering over injected backends.
///
/// Stateless across queries; safe to share behind an `Arc`.
pub struct DocQa {
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    lexical_index: Arc<dyn LexicalIndex>,
    generator: Arc<dyn Generator>,
    fuser: CandidateFuser,
    reranker: Reranker,
    assembler: PromptAssembler,
    retry: RetryPolicy,
    settings: DocQaSettings,
}

impl DocQa {
    pub fn new(
        collaborators: Collaborators,
        fusion: FusionPolicy,
        retry: RetryPolicy,
        settings: DocQaSettings,
    ) -> Result<Self> {
        if settings.rerank_top_n == 0 {
            return Err(AppError::Configuration {
                message: "rerank top_n must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            embedder: collaborators.embedder,
            vector_index: collaborators.vector_index,
            lexical_index: collaborators.lexical_index,
            generator: collaborators.generator,
            fuser: CandidateFuser::new(fusion)?,
            reranker: Reranker::new(collaborators.rerank_provider, retry.clone()),
            assembler: PromptAssembler::new(),
            retry,
            settings,
        })
    }

    pub fn settings(&self) -> &DocQaSettings {
        &self.settings
    }

    pub fn fusion_policy(&self) -> &FusionPolicy {
        self.fuser.policy()
    }

    /// Answer `query` with the configured model
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let model = self.settings.model.clone();
        self.answer_with_model(query, &model).await
    }

    /// Answer `query`, overriding the generation model for this call
    pub async fn answer_with_model(&self, query: &str, model: &str) -> Result<Answer> {
        let query_id = Uuid::new_v4();
        let span = info_span!("doc_qa", %query_id);

        async {
            let start = Instant::now();
            let result = self.run(query, model).await;
            let elapsed = start.elapsed();
            metrics::record_query(elapsed.as_secs_f64(), result.is_ok());

            match result {
                Ok(mut answer) => {
                    answer.elapsed_ms = elapsed.as_millis() as u64;
                    info!(
                        elapsed_ms = answer.elapsed_ms,
                        passages = answer.passages.len(),
                        citations = answer.citations.len(),
                        "Query answered"
                    );
                    Ok(answer)
                }
                Err(err) => {
                    tracing::error!(error = %err, "Query failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run RETRIEVE, FUSE and RERANK without generating an answer
    pub async fn retrieve_context(&self, query: &str) -> Result<RetrievedContext> {
        let query = validate_query(query)?;
        self.gather(query).await
    }

    async fn run(&self, query: &str, model: &str) -> Result<Answer> {
        let query = validate_query(query)?;
        let context = self.gather(query).await?;

        let QaPrompt {
            prompt_text,
            context_block,
            source_block,
        } = self.assembler.assemble(&context.reranked, query);

        let timer = StageTimer::start(stage::GENERATE);
        let answer = self
            .generator
            .complete(&prompt_text, &self.settings.system_role, model)
            .await
            .map_err(|e| e.into_query_failure(query, stage::GENERATE))?;
        let elapsed_ms = timer.finish(context.reranked.len());
        info!(stage = stage::GENERATE, elapsed_ms, model, "Answer generated");

        let citations = extract_citations(&answer, &context.reranked);

        Ok(Answer {
            query: query.to_string(),
            answer,
            context_block,
            source_block,
            citations,
            passages: context.reranked,
            model: model.to_string(),
            elapsed_ms: 0,
            answered_at: Utc::now(),
        })
    }

    async fn gather(&self, query: &str) -> Result<RetrievedContext> {
        // RETRIEVE
        let timer = StageTimer::start(stage::RETRIEVE);
        let (vector, lexical) = tokio::try_join!(self.vector_search(query), self.lexical_search(query))
            .map_err(|e| e.into_query_failure(query, stage::RETRIEVE))?;
        let elapsed_ms = timer.finish(vector.len() + lexical.len());
        info!(
            stage = stage::RETRIEVE,
            elapsed_ms,
            vector = vector.len(),
            lexical = lexical.len(),
            "Candidates retrieved"
        );

        // FUSE
        let timer = StageTimer::start(stage::FUSE);
        let fused = self
            .fuser
            .fuse(&vector, &lexical)
            .map_err(|e| e.into_query_failure(query, stage::FUSE))?;
        let elapsed_ms = timer.finish(fused.len());
        info!(
            stage = stage::FUSE,
            elapsed_ms,
            policy = self.fuser.policy().name(),
            fused = fused.len(),
            "Candidates fused"
        );

        // RERANK
        let timer = StageTimer::start(stage::RERANK);
        let reranked = self
            .reranker
            .rerank(query, &fused.passages(), self.settings.rerank_top_n)
            .await
            .map_err(|e| e.into_query_failure(query, stage::RERANK))?;
        let elapsed_ms = timer.finish(reranked.len());
        info!(
            stage = stage::RERANK,
            elapsed_ms,
            provider = self.reranker.provider_name(),
            kept = reranked.len(),
            "Candidates reranked"
        );

        Ok(RetrievedContext {
            vector,
            lexical,
            fused,
            reranked,
        })
    }

    async fn vector_search(&self, query: &str) -> Result<RankedList> {
        // Embedding clients retry internally
        let embedding = self.embedder.embed(query).await?;
        let limit = self.settings.vector_limit;

        let result = self
            .retry
            .run("vector_search", || {
                bounded(
                    self.settings.search_timeout,
                    self.vector_index.name(),
                    self.vector_index.search(&embedding, limit),
                )
            })
            .await;
        metrics::record_backend_request(self.vector_index.name(), result.is_ok());

        Ok(result?.above_threshold(self.settings.vector_threshold))
    }

    async fn lexical_search(&self, query: &str) -> Result<RankedList> {
        let limit = self.settings.lexical_limit;

        let result = self
            .retry
            .run("lexical_search", || {
                bounded(
                    self.settings.search_timeout,
                    self.lexical_index.name(),
                    self.lexical_index.search(query, limit),
                )
            })
            .await;
        metrics::record_backend_request(self.lexical_index.name(), result.is_ok());

        result
    }
}

/// Reject blank queries; the caller's text is passed on unchanged
fn validate_query(query: &str) -> Result<&str> {
    if query.trim().is_empty() {
        return Err(AppError::validation("query", "Query must not be empty").into_query_failure(query, stage::VALIDATE));
    }
    Ok(query)
}

/// Run one backend call under `limit`, mapping expiry to a transport failure
async fn bounded<T>(limit: Duration, backend: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::unavailable(
            backend,
            format!("search timed out after {}ms", limit.as_millis()),
        )),
    }
}
