//! Document question-answering handler

use crate::AppState;
use axum::{extract::State, Json};
use docqa_common::errors::{AppError, Result};
use docqa_context::Citation;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Question request
#[derive(Debug, Deserialize, Validate)]
pub struct DocQaRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    /// Overrides the configured generation model
    #[validate(length(min = 1, max = 100))]
    pub model: Option<String>,
}

/// Answer response
#[derive(Debug, Serialize)]
pub struct DocQaResponse {
    pub question: String,
    pub answer: String,
    pub status: &'static str,
    pub contexts: String,
    pub sources: String,
    pub citations: Vec<Citation>,
    pub elapse_ms: u64,
}

/// Answer a question from the indexed documents
pub async fn doc_qa(
    State(state): State<AppState>,
    Json(request): Json<DocQaRequest>,
) -> Result<Json<DocQaResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    let model = request
        .model
        .clone()
        .unwrap_or_else(|| state.qa.settings().model.clone());

    let answer = tokio::time::timeout(
        state.config.request_timeout(),
        state.qa.answer_with_model(&request.query, &model),
    )
    .await
    .map_err(|_| {
        AppError::unavailable("gateway", "request timed out").into_query_failure(&request.query, "request")
    })??;

    tracing::info!(
        citations = answer.citations.len(),
        latency_ms = answer.elapsed_ms,
        "Question answered"
    );

    Ok(Json(DocQaResponse {
        question: answer.query,
        answer: answer.answer,
        status: "success",
        contexts: answer.context_block,
        sources: answer.source_block,
        citations: answer.citations,
        elapse_ms: answer.elapsed_ms,
    }))
}
