//! Entailment scoring
//!
//! Asks the completion service whether a text supports a question. The first
//! JSON object in the reply is parsed against a fixed schema; anything else is
//! treated as irrelevant.

use crate::errors::Result;
use crate::llm::{complete_timed, CompletionClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntailmentLabel {
    Supports,
    Contradicts,
    Irrelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entailment {
    pub label: EntailmentLabel,

    /// In `[0, 1]`
    pub confidence: f32,
}

impl Entailment {
    pub fn irrelevant() -> Self {
        Self {
            label: EntailmentLabel::Irrelevant,
            confidence: 0.0,
        }
    }
}

pub struct EntailmentScorer {
    llm: Arc<dyn CompletionClient>,
}

impl EntailmentScorer {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Score `text` against `question`. Only completion failures are errors;
    /// an unusable reply scores as irrelevant.
    pub async fn score(&self, question: &str, text: &str) -> Result<Entailment> {
        let reply = complete_timed(self.llm.as_ref(), &build_prompt(question, text)).await?;
        let parsed = parse_entailment(&reply);

        if parsed.is_none() {
            tracing::warn!(reply_chars = reply.len(), "Unparseable entailment reply");
        }
        Ok(parsed.unwrap_or_else(Entailment::irrelevant))
    }
}

fn build_prompt(question: &str, text: &str) -> String {
    format!(
        "Determine whether the document text supports the user question.\n\n\
         Respond with JSON only:\n\
         {{\"label\": \"supports\" | \"contradicts\" | \"irrelevant\", \"confidence\": 0.0-1.0}}\n\n\
         Question:\n{question}\n\n\
         Text:\n{text}\n"
    )
}

/// Strict parse of the first JSON object in `reply`. Text after the object is ignored.
pub fn parse_entailment(reply: &str) -> Option<Entailment> {
    let start = reply.find('{')?;
    let mut parsed = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<Entailment>()
        .next()?
        .ok()?;

    if !parsed.confidence.is_finite() {
        return None;
    }
    parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
    Some(parsed)
}
