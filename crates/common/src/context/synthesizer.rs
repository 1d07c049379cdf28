//! Grounded answer synthesis
//!
//! Builds one prompt from the filtered passages, calls the completion service
//! once and trims whatever comes back to a short plain-text answer.

use super::confidence::{Confidence, ConfidenceEstimator};
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::llm::{complete_timed, CompletionClient};
use crate::retrieval::Passage;
use regex_lite::Regex;
use std::sync::{Arc, OnceLock};

/// Fixed answer when no evidence survives retrieval and filtering
pub const NOT_AVAILABLE_ANSWER: &str =
    "The requested information is not available in the knowledge base.";

/// Substituted when the completion has no usable text left after cleaning
pub const UNCLEAR_ANSWER: &str =
    "The answer is not clearly stated in the policy text. Please contact support for confirmation.";

/// Answer text plus its confidence label, before citations are attached
#[derive(Debug, Clone, PartialEq)]
pub struct DraftAnswer {
    pub answer: String,
    pub confidence: Confidence,
}

impl DraftAnswer {
    pub fn not_available() -> Self {
        Self {
            answer: NOT_AVAILABLE_ANSWER.to_string(),
            confidence: Confidence::VeryLow,
        }
    }
}

pub struct Synthesizer {
    llm: Arc<dyn CompletionClient>,
    estimator: ConfidenceEstimator,
    max_sentences: usize,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn CompletionClient>, settings: &PipelineConfig) -> Self {
        Self {
            llm,
            estimator: ConfidenceEstimator::from_settings(settings),
            max_sentences: settings.max_answer_sentences.max(1),
        }
    }

    /// Answer `question` from `passages` only.
    ///
    /// No model call is made when `passages` is empty.
    pub async fn synthesize(&self, question: &str, passages: &[Passage]) -> Result<DraftAnswer> {
        if passages.is_empty() {
            return Ok(DraftAnswer::not_available());
        }

        let prompt = build_prompt(question, passages);
        let raw = complete_timed(self.llm.as_ref(), &prompt).await?;
        let answer = clean_answer(&raw, self.max_sentences);
        let confidence = self.estimator.confidence(passages);

        if answer.is_empty() {
            tracing::warn!(
                model = self.llm.model_name(),
                raw_chars = raw.len(),
                "Completion empty after cleaning, using fallback answer"
            );
            return Ok(DraftAnswer {
                answer: UNCLEAR_ANSWER.to_string(),
                confidence: confidence.min(Confidence::Low),
            });
        }

        tracing::debug!(
            model = self.llm.model_name(),
            raw_chars = raw.len(),
            answer_chars = answer.len(),
            "Synthesized answer"
        );

        Ok(DraftAnswer { answer, confidence })
    }
}

/// Grounding prompt. Passage texts are joined in the order received.
pub fn build_prompt(question: &str, passages: &[Passage]) -> String {
    let kb_content = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the user question strictly based on the provided policy text.\n\n\
         Question:\n{question}\n\n\
         Policy text:\n{kb_content}\n\n\
         Rules:\n\
         - Answer ONLY from the policy text\n\
         - Do NOT invent rules or facts\n\
         - Prefer short direct answers\n\
         - If the answer depends on another condition (for example a refund that depends on cancellation), mention both cases\n\
         - If the answer is not clearly stated in the policy text, say so explicitly\n\n\
         Respond with 2-3 concise sentences.\n"
    )
}

fn heading_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#+\s*").expect("heading regex is valid"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// Strip markdown headings, collapse whitespace and keep the first
/// `max_sentences` sentences. Text without terminators comes back whole.
pub fn clean_answer(raw: &str, max_sentences: usize) -> String {
    let text = heading_marker().replace_all(raw, " ");
    let text = whitespace_run().replace_all(&text, " ");
    let text = text.trim();

    split_sentences(text)
        .into_iter()
        .take(max_sentences)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next, n)) = chars.peek() {
            if n.is_whitespace() {
                sentences.push(&text[start..next]);
                start = next + n.len_utf8();
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}
