//! Passage retrieval
//!
//! Two backends behind one trait:
//! - pgvector similarity over a `passages` table
//! - an in-memory snapshot of pre-embedded passages
//!
//! Both return at most `k` passages ordered by decreasing relevance. An empty
//! result is a valid answer, not an error.

mod memory;
mod vector;

pub use memory::{InMemoryRetriever, SnapshotEntry};
pub use vector::PgVectorRetriever;

use crate::config::{AppConfig, RetrievalBackend};
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source label used when the index carries no file name
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// One retrieved knowledge-base chunk. Never mutated after retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Chunk text
    pub text: String,

    /// Originating file name, or [`UNKNOWN_SOURCE`]
    pub source: String,

    /// Index similarity; range depends on the backend metric
    pub score: Option<f32>,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: Option<String>, score: Option<f32>) -> Self {
        let source = source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
        Self {
            text: text.into(),
            source,
            score,
        }
    }
}

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Top-`k` passages for `question`, most relevant first
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Passage>>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Readiness check; backends without a remote store are always ready
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the configured retriever. Connects to Postgres or loads the snapshot.
pub async fn create_retriever(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn Retriever>> {
    match config.retrieval.backend {
        RetrievalBackend::Pgvector => {
            let db = Arc::new(DbPool::new(&config.database).await?);
            Ok(Arc::new(PgVectorRetriever::new(
                db,
                embedder,
                &config.retrieval.table,
            )?))
        }
        RetrievalBackend::Memory => Ok(Arc::new(
            InMemoryRetriever::load(&config.retrieval.snapshot_path, embedder).await?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_becomes_unknown() {
        assert_eq!(Passage::new("text", None, Some(0.5)).source, UNKNOWN_SOURCE);
        assert_eq!(Passage::new("text", Some("  ".into()), None).source, UNKNOWN_SOURCE);
        assert_eq!(
            Passage::new("text", Some("refunds.md".into()), None).source,
            "refunds.md"
        );
    }
}
