//! Deterministic collaborators shared by the context tests

use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::retrieval::{Passage, Retriever};
use async_trait::async_trait;
use std::collections::HashMap;

pub fn passage(text: &str, source: &str, score: f32) -> Passage {
    Passage::new(text, Some(source.to_string()), Some(score))
}

/// Embedder with hand-placed vectors; unknown text maps to the zero vector.
pub struct FixedEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: &[f32]) -> Self {
        assert_eq!(vector.len(), self.dimension);
        self.vectors.insert(text.to_string(), vector.to_vec());
        self
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder that always fails, standing in for an unreachable service
pub struct OfflineEmbedder;

#[async_trait]
impl Embedder for OfflineEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingError {
            message: "connection refused".to_string(),
        })
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::EmbeddingError {
            message: "connection refused".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "offline"
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Retriever returning a fixed result list, truncated to `k`
pub struct StaticRetriever {
    passages: Vec<Passage>,
}

impl StaticRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _question: &str, k: usize) -> Result<Vec<Passage>> {
        Ok(self.passages.iter().take(k).cloned().collect())
    }

    fn backend(&self) -> &'static str {
        "static"
    }
}
