//! BM25 lexical search against an Elasticsearch index
//!
//! Issues a `match` query on the configured text field and reads passages
//! back from `_source`.

use super::{Backend, LexicalIndex, Passage, RankedList};
use docqa_common::config::LexicalConfig;
use docqa_common::errors::{AppError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Lexical index served by Elasticsearch
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    text_field: String,
    source_field: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: Value,
}

impl ElasticsearchIndex {
    pub fn new(config: &LexicalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.elasticsearch_url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            text_field: config.text_field.clone(),
            source_field: config.source_field.clone(),
        })
    }

    fn build_body(&self, query: &str, limit: usize) -> Value {
        let mut matcher = serde_json::Map::new();
        matcher.insert(self.text_field.clone(), Value::from(query));

        json!({
            "query": { "match": matcher },
            "size": limit,
            "_source": [self.text_field, self.source_field],
        })
    }

    fn parse_hits(&self, response: SearchResponse) -> Result<Vec<(Passage, f32)>> {
        response
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let field = |name: &str| {
                    hit.source
                        .get(name)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            AppError::malformed("elasticsearch", format!("hit missing _source.{}", name))
                        })
                };
                let text = field(&self.text_field)?;
                let source = field(&self.source_field)?;
                let score = hit
                    .score
                    .ok_or_else(|| AppError::malformed("elasticsearch", "hit missing _score"))?;
                Ok((Passage::new(text, source), score))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl LexicalIndex for ElasticsearchIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<RankedList> {
        if limit == 0 {
            return Ok(RankedList::empty(Backend::Lexical));
        }

        let url = format!("{}/{}/_search", self.base_url, self.index);
        let response = self
            .client
            .post(&url)
            .json(&self.build_body(query, limit))
            .send()
            .await
            .map_err(|e| AppError::unavailable("elasticsearch", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status("elasticsearch", status, &body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_body_error("elasticsearch", e))?;

        let hits = self.parse_hits(parsed)?;
        tracing::debug!(hits = hits.len(), index = %self.index, "Elasticsearch search complete");
        Ok(RankedList::from_hits(Backend::Lexical, hits))
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}
