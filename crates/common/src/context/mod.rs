//! Answer pipeline core
//!
//! - Topic filtering of the retrieval set (seeded K-means)
//! - Grounded synthesis and retrieval-score confidence
//! - Citation ranking and reply formatting
//! - Entailment scoring and query decomposition helpers

mod citation;
mod cluster_filter;
mod confidence;
mod decomposer;
mod entailment;
mod kmeans;
mod pipeline;
mod synthesizer;

#[cfg(test)]
pub(crate) mod testing;

pub use citation::{CitationRanker, ScoredSource};
pub use cluster_filter::{Cluster, ClusterFilter};
pub use confidence::{Confidence, ConfidenceEstimator};
pub use decomposer::{parse_sub_questions, QueryDecomposer, MAX_SUB_QUESTIONS};
pub use entailment::{parse_entailment, Entailment, EntailmentLabel, EntailmentScorer};
pub use kmeans::{kmeans, KMeansResult};
pub use pipeline::{format_reply, AnswerPipeline, PolicyAnswer};
pub use synthesizer::{
    build_prompt, clean_answer, DraftAnswer, Synthesizer, NOT_AVAILABLE_ANSWER, UNCLEAR_ANSWER,
};
