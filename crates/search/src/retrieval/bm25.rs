//! BM25 lexical search using PostgreSQL full-text search
//!
//! Provides keyword-based search with ranking

use super::{validate_identifier, Backend, LexicalIndex, Passage, RankedList};
use docqa_common::config::{LexicalConfig, VectorConfig};
use docqa_common::db::DbPool;
use docqa_common::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use std::sync::Arc;

/// Lexical index over the passage table's `text_search_vector` column
pub struct PgLexicalIndex {
    db: Arc<DbPool>,
    table: String,
    ts_config: String,
}

impl PgLexicalIndex {
    /// Create a new lexical index sharing the vector index's passage table
    pub fn new(db: Arc<DbPool>, vector: &VectorConfig, lexical: &LexicalConfig) -> Result<Self> {
        validate_identifier(&vector.table)?;

        Ok(Self {
            db,
            table: vector.table.clone(),
            ts_config: lexical.ts_config.clone(),
        })
    }

    fn build_query(&self) -> String {
        // Normalization 32 maps ts_rank_cd into rank/(rank+1)
        format!(
            r#"
            SELECT
                content,
                source,
                ts_rank_cd(text_search_vector, plainto_tsquery($2::regconfig, $1), 32)::float8 AS score
            FROM {table}
            WHERE text_search_vector @@ plainto_tsquery($2::regconfig, $1)
            ORDER BY score DESC
            LIMIT $3
            "#,
            table = self.table,
        )
    }
}

/// Whether a query has anything full-text search can match on
fn has_terms(query: &str) -> bool {
    query.split_whitespace().any(|w| w.chars().any(|c| c.is_alphanumeric()))
}

#[async_trait::async_trait]
impl LexicalIndex for PgLexicalIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<RankedList> {
        if !has_terms(query) || limit == 0 {
            return Ok(RankedList::empty(Backend::Lexical));
        }

        let sql = self.build_query();
        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![
                    query.to_string().into(),
                    self.ts_config.clone().into(),
                    (limit as i64).into(),
                ],
            ))
            .await
            .map_err(|e| AppError::unavailable("postgres_fts", format!("BM25 search failed: {}", e)))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let text: String = row
                .try_get("", "content")
                .map_err(|e| AppError::malformed("postgres_fts", format!("row missing content: {}", e)))?;
            let source: String = row
                .try_get("", "source")
                .map_err(|e| AppError::malformed("postgres_fts", format!("row missing source: {}", e)))?;
            let score: f64 = row
                .try_get("", "score")
                .map_err(|e| AppError::malformed("postgres_fts", format!("row missing score: {}", e)))?;

            hits.push((Passage::new(text, source), score as f32));
        }

        tracing::debug!(hits = hits.len(), limit, "Lexical search complete");
        Ok(RankedList::from_hits(Backend::Lexical, hits))
    }

    fn name(&self) -> &str {
        "postgres_fts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_terms() {
        assert!(has_terms("hybrid search"));
        assert!(has_terms("亚洲杯"));
        assert!(!has_terms("   "));
        assert!(!has_terms("?? !!"));
    }
}
