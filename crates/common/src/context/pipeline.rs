//! Answer pipeline
//!
//! Retriever -> ClusterFilter -> Synthesizer + ConfidenceEstimator ->
//! CitationRanker, then the reply text handed to the mail layer.
//!
//! Every collaborator is an explicit handle built once at startup. A run keeps
//! no state between questions, so one pipeline serves concurrent requests.

use super::citation::CitationRanker;
use super::cluster_filter::ClusterFilter;
use super::confidence::Confidence;
use super::synthesizer::{DraftAnswer, Synthesizer};
use crate::config::{MailConfig, PipelineConfig};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::llm::CompletionClient;
use crate::metrics;
use crate::retrieval::Retriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Structured result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAnswer {
    pub answer: String,
    pub confidence: Confidence,

    /// Distinct source identifiers, best first, at most `max_sources`
    pub sources: Vec<String>,
}

impl PolicyAnswer {
    fn not_available() -> Self {
        let draft = DraftAnswer::not_available();
        Self {
            answer: draft.answer,
            confidence: draft.confidence,
            sources: Vec::new(),
        }
    }
}

pub struct AnswerPipeline {
    retriever: Arc<dyn Retriever>,
    filter: ClusterFilter,
    synthesizer: Synthesizer,
    citations: CitationRanker,
    retrieve_k: usize,
    disclaimer: String,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn CompletionClient>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            synthesizer: Synthesizer::new(llm, &settings),
            citations: CitationRanker::new(embedder.clone(), &settings),
            retrieve_k: settings.retrieve_k,
            filter: ClusterFilter::new(embedder, settings),
            disclaimer: MailConfig::default().disclaimer,
        }
    }

    /// Replace the reply header
    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.disclaimer = disclaimer.into();
        self
    }

    pub fn disclaimer(&self) -> &str {
        &self.disclaimer
    }

    /// Run the full pipeline for `question`.
    ///
    /// Collaborator failures propagate unchanged; nothing is retried here.
    #[instrument(skip(self), fields(backend = self.retriever.backend()))]
    pub async fn answer(&self, question: &str) -> Result<PolicyAnswer> {
        let start = Instant::now();

        let retrieved = self.retriever.retrieve(question, self.retrieve_k).await?;
        let retrieved_count = retrieved.len();

        if retrieved.is_empty() {
            let answer = PolicyAnswer::not_available();
            metrics::record_answer(
                start.elapsed().as_secs_f64(),
                answer.confidence.as_str(),
                0,
                0,
            );
            info!("No passages retrieved");
            return Ok(answer);
        }

        let kept = self.filter.filter(question, retrieved).await?;
        let draft = self.synthesizer.synthesize(question, &kept).await?;
        let sources = self
            .citations
            .rank_sources(question, &draft.answer, &kept)
            .await?;

        let duration = start.elapsed();
        metrics::record_answer(
            duration.as_secs_f64(),
            draft.confidence.as_str(),
            retrieved_count,
            kept.len(),
        );

        info!(
            retrieved = retrieved_count,
            kept = kept.len(),
            confidence = %draft.confidence,
            sources = sources.len(),
            duration_ms = duration.as_millis() as u64,
            "Answered question"
        );

        Ok(PolicyAnswer {
            answer: draft.answer,
            confidence: draft.confidence,
            sources,
        })
    }

    /// Answer `question` and render the reply body
    pub async fn answer_question(&self, question: &str) -> Result<String> {
        let answer = self.answer(question).await?;
        Ok(format_reply(&self.disclaimer, &answer))
    }
}

/// Reply body: disclaimer, answer, confidence label and one `- source` line
/// per citation.
pub fn format_reply(disclaimer: &str, answer: &PolicyAnswer) -> String {
    let mut reply = format!(
        "{}\n\nAnswer:\n{}\n\nConfidence: {}\n\nSources:",
        disclaimer.trim(),
        answer.answer,
        answer.confidence
    );
    for source in &answer.sources {
        reply.push_str("\n- ");
        reply.push_str(source);
    }
    reply
}
