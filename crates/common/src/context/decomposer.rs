//! Compound question decomposition

use crate::errors::Result;
use crate::llm::{complete_timed, CompletionClient};
use std::sync::Arc;

/// Upper bound on sub-questions kept from one reply
pub const MAX_SUB_QUESTIONS: usize = 5;

/// Lines this short or shorter are noise
const MIN_LINE_CHARS: usize = 5;

pub struct QueryDecomposer {
    llm: Arc<dyn CompletionClient>,
}

impl QueryDecomposer {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Split `question` into simpler policy questions, one per reply line.
    pub async fn decompose(&self, question: &str) -> Result<Vec<String>> {
        let reply = complete_timed(self.llm.as_ref(), &build_prompt(question)).await?;
        let parts = parse_sub_questions(&reply);

        tracing::debug!(parts = parts.len(), "Decomposed question");
        Ok(parts)
    }
}

fn build_prompt(question: &str) -> String {
    format!(
        "Decompose the user question into simpler policy questions.\n\n\
         Rules:\n\
         - produce 2-5 atomic questions\n\
         - preserve meaning exactly\n\
         - do not assume missing facts\n\
         - do not answer\n\
         - one question per line\n\n\
         User question:\n{question}\n"
    )
}

pub fn parse_sub_questions(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| strip_list_marker(line.trim()))
        .filter(|line| line.chars().count() > MIN_LINE_CHARS)
        .take(MAX_SUB_QUESTIONS)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim_start();
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletion;

    #[test]
    fn test_parse_strips_markers_and_noise() {
        let reply = "1. Can I delete my account?\n\n- ok\n2) Is a refund possible after a charge?\n* What happens to my data?";
        assert_eq!(
            parse_sub_questions(reply),
            vec![
                "Can I delete my account?",
                "Is a refund possible after a charge?",
                "What happens to my data?",
            ]
        );
    }

    #[test]
    fn test_parse_caps_at_five() {
        let reply = (1..=8)
            .map(|i| format!("Question number {}?", i))
            .collect::<Vec<_>>()
            .join("\n");
        let parts = parse_sub_questions(&reply);
        assert_eq!(parts.len(), MAX_SUB_QUESTIONS);
        assert_eq!(parts[4], "Question number 5?");
    }

    #[test]
    fn test_numbers_without_marker_kept() {
        assert_eq!(strip_list_marker("30 days or more?"), "30 days or more?");
    }

    #[tokio::test]
    async fn test_decompose_uses_completion() {
        let llm = Arc::new(MockCompletion::new("Can I cancel?\nWill I be refunded?"));
        let decomposer = QueryDecomposer::new(llm.clone());

        let parts = decomposer
            .decompose("If I cancel, will I be refunded?")
            .await
            .unwrap();

        assert_eq!(parts, vec!["Can I cancel?", "Will I be refunded?"]);
        assert!(llm.prompts()[0].contains("User question:\nIf I cancel, will I be refunded?"));
    }
}
