//! Vector similarity search using pgvector
//!
//! Expects a table with `content text`, `source text NULL` and
//! `embedding vector(N)` columns, written by the ingestion job.

use super::{Passage, Retriever};
use crate::db::DbPool;
use crate::embeddings::{embed_one, Embedder};
use crate::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use std::sync::Arc;

/// Vector retriever using pgvector cosine distance
pub struct PgVectorRetriever {
    db: Arc<DbPool>,
    embedder: Arc<dyn Embedder>,
    table: String,
}

impl PgVectorRetriever {
    /// Create a new vector retriever over `table`
    pub fn new(db: Arc<DbPool>, embedder: Arc<dyn Embedder>, table: &str) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Configuration {
                message: format!("Invalid passages table name: {:?}", table),
            });
        }

        Ok(Self {
            db,
            embedder,
            table: table.to_string(),
        })
    }

    fn build_query(&self) -> String {
        format!(
            r#"
            SELECT
                content,
                source,
                (1 - (embedding <=> $1::vector))::float8 AS score
            FROM {table}
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            table = self.table
        )
    }
}

/// pgvector literal, e.g. `[0.1,0.2,0.3]`
fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

#[async_trait::async_trait]
impl Retriever for PgVectorRetriever {
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Passage>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = embed_one(self.embedder.as_ref(), question).await?;

        let rows = self.db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                self.build_query(),
                vec![vector_literal(&embedding).into(), (k as i64).into()],
            ))
            .await
            .map_err(|e| AppError::RetrievalError {
                message: format!("Vector search failed: {}", e),
            })?;

        let mut passages = Vec::with_capacity(rows.len());
        for row in rows {
            let content: String = row.try_get("", "content")?;
            let source: Option<String> = row.try_get("", "source")?;
            let score: Option<f64> = row.try_get("", "score")?;
            passages.push(Passage::new(content, source, score.map(|s| s as f32)));
        }

        tracing::debug!(
            table = %self.table,
            requested = k,
            returned = passages.len(),
            "pgvector search completed"
        );

        Ok(passages)
    }

    fn backend(&self) -> &'static str {
        "pgvector"
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal_format() {
        assert_eq!(vector_literal(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
