//! Cohere rerank API client

use super::{RerankHit, RerankProvider, RerankTarget};
use docqa_common::config::RerankConfig;
use docqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cross-encoder reranker served by Cohere's `/rerank` endpoint
pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: Option<usize>,
    relevance_score: Option<f32>,
    document: Option<RerankDocument>,
}

#[derive(Deserialize)]
struct RerankDocument {
    text: String,
}

impl CohereReranker {
    pub fn new(config: &RerankConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

fn into_hits(response: RerankResponse) -> Result<Vec<RerankHit>> {
    response
        .results
        .into_iter()
        .map(|r| {
            let relevance_score = r
                .relevance_score
                .ok_or_else(|| AppError::malformed("cohere", "result missing relevance_score"))?;

            // Prefer the index; fall back to the echoed text
            let target = match (r.index, r.document) {
                (Some(index), _) => RerankTarget::Index(index),
                (None, Some(doc)) => RerankTarget::Text(doc.text),
                (None, None) => {
                    return Err(AppError::malformed("cohere", "result has neither index nor document"));
                }
            };

            Ok(RerankHit {
                target,
                relevance_score,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl RerankProvider for CohereReranker {
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankHit>> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
            return_documents: true,
        };

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::unavailable("cohere", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status("cohere", status, &body));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_body_error("cohere", e))?;

        into_hits(parsed)
    }

    fn name(&self) -> &str {
        "cohere"
    }
}
