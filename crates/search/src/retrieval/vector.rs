//! Vector similarity search using pgvector
//!
//! Provides semantic search via embedding similarity

use super::{validate_identifier, Backend, Passage, RankedList, VectorIndex};
use docqa_common::config::{SimilarityMetric, VectorConfig};
use docqa_common::db::DbPool;
use docqa_common::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement};
use std::sync::Arc;

/// Vector index backed by a pgvector column
pub struct PgVectorIndex {
    db: Arc<DbPool>,
    table: String,
    metric: SimilarityMetric,
}

impl PgVectorIndex {
    /// Create a new vector index over `config.table`
    pub fn new(db: Arc<DbPool>, config: &VectorConfig) -> Result<Self> {
        validate_identifier(&config.table)?;

        Ok(Self {
            db,
            table: config.table.clone(),
            metric: config.metric,
        })
    }

    /// Build the similarity query.
    ///
    /// Both expressions are "higher is better" so callers can threshold
    /// uniformly; `<#>` returns the negated inner product.
    fn build_query(&self) -> String {
        let (score, order) = match self.metric {
            SimilarityMetric::Cosine => (
                "1 - (embedding <=> $1::vector)",
                "embedding <=> $1::vector",
            ),
            SimilarityMetric::InnerProduct => (
                "(embedding <#> $1::vector) * -1",
                "embedding <#> $1::vector",
            ),
        };

        format!(
            r#"
            SELECT
                content,
                source,
                ({score})::float8 AS score
            FROM {table}
            ORDER BY {order}
            LIMIT $2
            "#,
            score = score,
            table = self.table,
            order = order,
        )
    }
}

/// Render an embedding as a pgvector literal
pub(crate) fn format_embedding(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

fn parse_row(row: &QueryResult) -> Result<(Passage, f32)> {
    let missing = |col: &str, e: sea_orm::DbErr| {
        AppError::malformed("pgvector", format!("row missing {}: {}", col, e))
    };

    let text: String = row.try_get("", "content").map_err(|e| missing("content", e))?;
    let source: String = row.try_get("", "source").map_err(|e| missing("source", e))?;
    let score: f64 = row.try_get("", "score").map_err(|e| missing("score", e))?;

    Ok((Passage::new(text, source), score as f32))
}

#[async_trait::async_trait]
impl VectorIndex for PgVectorIndex {
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<RankedList> {
        if embedding.is_empty() {
            return Err(AppError::validation("embedding", "Query embedding is empty"));
        }
        if limit == 0 {
            return Ok(RankedList::empty(Backend::Vector));
        }

        let sql = self.build_query();
        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![format_embedding(embedding).into(), (limit as i64).into()],
            ))
            .await
            .map_err(|e| AppError::unavailable("pgvector", format!("Vector search failed: {}", e)))?;

        let hits = rows.iter().map(parse_row).collect::<Result<Vec<_>>>()?;

        tracing::debug!(hits = hits.len(), limit, "Vector search complete");
        Ok(RankedList::from_hits(Backend::Vector, hits))
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}
