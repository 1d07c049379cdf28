//! Citation ranking
//!
//! Each passage's source is scored by a blend of its similarity to the
//! question and to the generated answer. Weighting the question higher keeps a
//! source from being cited just because it echoes the answer's wording.

use crate::config::PipelineConfig;
use crate::embeddings::{dot, embed_normalized, embed_one, Embedder};
use crate::errors::Result;
use crate::retrieval::Passage;
use std::collections::HashSet;
use std::sync::Arc;

/// One scored passage, kept for logging
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSource {
    pub source: String,
    pub question_similarity: f32,
    pub answer_similarity: f32,
    pub score: f32,
}

pub struct CitationRanker {
    embedder: Arc<dyn Embedder>,
    question_weight: f32,
    answer_weight: f32,
    max_sources: usize,
}

impl CitationRanker {
    pub fn new(embedder: Arc<dyn Embedder>, settings: &PipelineConfig) -> Self {
        Self {
            embedder,
            question_weight: settings.question_weight,
            answer_weight: settings.answer_weight,
            max_sources: settings.max_sources,
        }
    }

    /// Score every passage against `question` and `answer`, best first.
    ///
    /// Equal scores keep retrieval order.
    pub async fn score_passages(
        &self,
        question: &str,
        answer: &str,
        passages: &[Passage],
    ) -> Result<Vec<ScoredSource>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let question_vector = embed_one(self.embedder.as_ref(), question).await?;
        let answer_vector = embed_one(self.embedder.as_ref(), answer).await?;

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let passage_vectors = embed_normalized(self.embedder.as_ref(), &texts).await?;

        let mut scored: Vec<ScoredSource> = passages
            .iter()
            .zip(passage_vectors.iter())
            .map(|(passage, vector)| {
                let question_similarity = dot(vector, &question_vector);
                let answer_similarity = dot(vector, &answer_vector);
                ScoredSource {
                    source: passage.source.clone(),
                    question_similarity,
                    answer_similarity,
                    score: self.question_weight * question_similarity
                        + self.answer_weight * answer_similarity,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }

    /// Up to `max_sources` distinct source identifiers, best first.
    pub async fn rank_sources(
        &self,
        question: &str,
        answer: &str,
        passages: &[Passage],
    ) -> Result<Vec<String>> {
        let scored = self.score_passages(question, answer, passages).await?;
        let sources = distinct_sources(&scored, self.max_sources);

        tracing::debug!(
            candidates = scored.len(),
            cited = sources.len(),
            top_score = scored.first().map(|s| s.score),
            "Ranked citations"
        );

        Ok(sources)
    }
}

fn distinct_sources(scored: &[ScoredSource], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for entry in scored {
        if sources.len() >= limit {
            break;
        }
        if seen.insert(entry.source.as_str()) {
            sources.push(entry.source.clone());
        }
    }
    sources
}
