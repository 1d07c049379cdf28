//! Retrieval-similarity confidence
//!
//! The generator is not asked how sure it is. Confidence comes from the mean
//! retrieval score of the evidence actually handed to it.

use crate::config::PipelineConfig;
use crate::retrieval::Passage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse confidence label. Ordering follows strength: `VeryLow < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    /// Reserved for the no-evidence answer
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::VeryLow => "Very Low",
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps mean retrieval similarity to a [`Confidence`]
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceEstimator {
    high: f32,
    medium: f32,
}

impl ConfidenceEstimator {
    pub fn new(high: f32, medium: f32) -> Self {
        Self { high, medium }
    }

    pub fn from_settings(settings: &PipelineConfig) -> Self {
        Self::new(settings.high_confidence, settings.medium_confidence)
    }

    /// Mean over passages that carry a finite score; 0.0 when none do.
    pub fn mean_score(passages: &[Passage]) -> f32 {
        let scores: Vec<f32> = passages
            .iter()
            .filter_map(|p| p.score)
            .filter(|s| s.is_finite())
            .collect();

        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        }
    }

    pub fn label(&self, mean: f32) -> Confidence {
        if mean > self.high {
            Confidence::High
        } else if mean > self.medium {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn confidence(&self, passages: &[Passage]) -> Confidence {
        self.label(Self::mean_score(passages))
    }
}

impl Default for ConfidenceEstimator {
    fn default() -> Self {
        Self::from_settings(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::passage;

    #[test]
    fn test_thresholds_are_strict() {
        let estimator = ConfidenceEstimator::default();
        assert_eq!(estimator.label(0.71), Confidence::High);
        assert_eq!(estimator.label(0.70), Confidence::Medium);
        assert_eq!(estimator.label(0.51), Confidence::Medium);
        assert_eq!(estimator.label(0.50), Confidence::Low);
        assert_eq!(estimator.label(-0.2), Confidence::Low);
    }

    #[test]
    fn test_mean_ignores_unscored_passages() {
        let passages = vec![
            passage("a", "a.md", 0.9),
            Passage::new("b", None, None),
            passage("c", "c.md", 0.7),
        ];
        assert!((ConfidenceEstimator::mean_score(&passages) - 0.8).abs() < 1e-6);
        assert_eq!(ConfidenceEstimator::default().confidence(&passages), Confidence::High);
    }

    #[test]
    fn test_no_scores_is_low() {
        let passages = vec![Passage::new("b", None, None)];
        assert_eq!(ConfidenceEstimator::mean_score(&passages), 0.0);
        assert_eq!(ConfidenceEstimator::default().confidence(&passages), Confidence::Low);
        assert_eq!(ConfidenceEstimator::default().confidence(&[]), Confidence::Low);
    }

    #[test]
    fn test_monotonic_in_scores() {
        let estimator = ConfidenceEstimator::default();
        let base = [0.1f32, 0.35, 0.55, 0.4];
        let mut previous = Confidence::VeryLow;

        for step in 0..40 {
            let bump = step as f32 * 0.025;
            let passages: Vec<Passage> = base
                .iter()
                .map(|s| passage("t", "s.md", s + bump))
                .collect();
            let label = estimator.confidence(&passages);
            assert!(label >= previous, "label dropped at step {}", step);
            previous = label;
        }
        assert_eq!(previous, Confidence::High);
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&Confidence::VeryLow).unwrap(), "\"Very Low\"");
        assert_eq!(Confidence::High.to_string(), "High");
    }
}
