//! Text embedding handler

use crate::AppState;
use axum::{extract::State, Json};
use docqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Embedding request
#[derive(Debug, Deserialize, Validate)]
pub struct EmbeddingRequest {
    #[validate(length(min = 1, max = 8000))]
    pub text: String,
}

/// Embedding response; `text` echoes the request unchanged
#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub text: String,
    pub dimensions: usize,
    pub embedding: Vec<f32>,
}

/// Embed a single text with the configured embedding model
pub async fn embedding(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("text".to_string()),
    })?;

    let input = request.text.replace('\n', " ");
    if input.trim().is_empty() {
        return Err(AppError::validation("text", "Text must not be blank"));
    }

    let embedding = tokio::time::timeout(state.config.request_timeout(), state.embedder.embed(&input))
        .await
        .map_err(|_| AppError::unavailable("embedding", "request timed out"))??;

    tracing::debug!(
        model = state.embedder.model_name(),
        dimensions = embedding.len(),
        "Text embedded"
    );

    Ok(Json(EmbeddingResponse {
        text: request.text,
        dimensions: embedding.len(),
        embedding,
    }))
}
