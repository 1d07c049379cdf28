//! In-memory retriever over a pre-embedded passage snapshot
//!
//! The snapshot is a JSON array of `{text, source, embedding}` objects. It is
//! loaded once at startup and read-only afterwards, so one instance can serve
//! concurrent requests.

use super::{Passage, Retriever};
use crate::embeddings::{dot, embed_normalized, embed_one, l2_normalize, Embedder};
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One row of the on-disk snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    pub embedding: Vec<f32>,
}

/// Brute-force cosine retriever
pub struct InMemoryRetriever {
    entries: Vec<SnapshotEntry>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryRetriever {
    /// Wrap already-embedded entries. Embeddings are normalized here.
    pub fn new(mut entries: Vec<SnapshotEntry>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dimension = embedder.dimension();
        for entry in entries.iter_mut() {
            if entry.embedding.len() != dimension {
                return Err(AppError::Configuration {
                    message: format!(
                        "Snapshot embedding has dimension {}, embedder produces {}",
                        entry.embedding.len(),
                        dimension
                    ),
                });
            }
            l2_normalize(&mut entry.embedding);
        }

        Ok(Self { entries, embedder })
    }

    /// Load a JSON snapshot from `path`
    pub async fn load(path: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| AppError::Configuration {
            message: format!("Cannot read passage snapshot {}: {}", path, e),
        })?;
        let entries: Vec<SnapshotEntry> = serde_json::from_str(&raw)?;

        tracing::info!(path = %path, passages = entries.len(), "Loaded passage snapshot");

        Self::new(entries, embedder)
    }

    /// Embed `(text, source)` pairs with `embedder`. Used by tests and local tooling.
    pub async fn from_texts(
        texts: Vec<(String, Option<String>)>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let bodies: Vec<String> = texts.iter().map(|(t, _)| t.clone()).collect();
        let vectors = embed_normalized(embedder.as_ref(), &bodies).await?;

        let entries = texts
            .into_iter()
            .zip(vectors)
            .map(|((text, source), embedding)| SnapshotEntry {
                text,
                source,
                embedding,
            })
            .collect();

        Self::new(entries, embedder)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Passage>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query = embed_one(self.embedder.as_ref(), question).await?;

        let mut scored: Vec<(f32, &SnapshotEntry)> = self
            .entries
            .iter()
            .map(|entry| (dot(&entry.embedding, &query), entry))
            .collect();

        // Stable: equal scores keep snapshot order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| Passage::new(entry.text.clone(), entry.source.clone(), Some(score)))
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;

    fn corpus() -> Vec<(String, Option<String>)> {
        vec![
            ("Refunds are issued within 14 days of purchase".to_string(), Some("refunds.md".to_string())),
            ("Shipping takes five business days".to_string(), Some("shipping.md".to_string())),
            ("Passwords must be rotated every 90 days".to_string(), None),
        ]
    }

    #[tokio::test]
    async fn test_most_similar_passage_first() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(128));
        let retriever = InMemoryRetriever::from_texts(corpus(), embedder).await.unwrap();

        let passages = retriever.retrieve("How are refunds issued?", 2).await.unwrap();

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source, "refunds.md");
        assert!(passages[0].score.unwrap() >= passages[1].score.unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_is_unknown() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(128));
        let retriever = InMemoryRetriever::from_texts(corpus(), embedder).await.unwrap();

        let passages = retriever.retrieve("When must passwords be rotated?", 1).await.unwrap();
        assert_eq!(passages[0].source, super::super::UNKNOWN_SOURCE);
    }

    #[tokio::test]
    async fn test_empty_snapshot_returns_empty() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(16));
        let retriever = InMemoryRetriever::new(Vec::new(), embedder).unwrap();

        assert!(retriever.is_empty());
        assert!(retriever.retrieve("anything", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(16));
        let entries = vec![SnapshotEntry {
            text: "x".to_string(),
            source: None,
            embedding: vec![1.0; 8],
        }];
        assert!(InMemoryRetriever::new(entries, embedder).is_err());
    }
}
