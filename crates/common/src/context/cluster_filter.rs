//! Topic filter over the retrieval set
//!
//! The top-k retrieval set usually mixes several policy topics. Passages are
//! clustered in embedding space and only the clusters whose centroid sits
//! closest to the question survive.

use super::kmeans::kmeans;
use crate::config::PipelineConfig;
use crate::embeddings::{dot, embed_normalized, embed_one, Embedder};
use crate::errors::Result;
use crate::retrieval::Passage;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// One non-empty cluster of a single filter run
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: usize,

    /// Indices into the passage slice
    pub members: Vec<usize>,

    /// Mean of member embeddings (not renormalized)
    pub centroid: Vec<f32>,

    /// Dot product of centroid and question embedding
    pub similarity: f32,
}

/// Embedding-space cluster filter
pub struct ClusterFilter {
    embedder: Arc<dyn Embedder>,
    settings: PipelineConfig,
}

impl ClusterFilter {
    pub fn new(embedder: Arc<dyn Embedder>, settings: PipelineConfig) -> Self {
        Self { embedder, settings }
    }

    /// Keep the passages belonging to the clusters most similar to `question`.
    ///
    /// Sets too small to cluster come back untouched. The result is never
    /// empty when the input is not.
    pub async fn filter(&self, question: &str, passages: Vec<Passage>) -> Result<Vec<Passage>> {
        let Some(cluster_count) = self.settings.cluster_count(passages.len()) else {
            debug!(passages = passages.len(), "Too few passages to cluster");
            return Ok(passages);
        };

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = embed_normalized(self.embedder.as_ref(), &texts).await?;
        let question_vector = embed_one(self.embedder.as_ref(), question).await?;

        let partition = kmeans(
            &vectors,
            cluster_count,
            self.settings.kmeans_seed,
            self.settings.kmeans_max_iterations,
        );

        let mut clusters = build_clusters(&vectors, &partition.assignments, partition.k, &question_vector);

        // Stable: equal similarity keeps the lower cluster id first
        clusters.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let chosen: HashSet<usize> = clusters
            .iter()
            .take(self.settings.selected_clusters)
            .map(|c| c.id)
            .collect();

        debug!(
            passages = passages.len(),
            clusters = partition.k,
            non_empty = clusters.len(),
            iterations = partition.iterations,
            chosen = ?chosen,
            "Clustered retrieval set"
        );

        let total = passages.len();
        let kept: Vec<Passage> = passages
            .iter()
            .zip(partition.assignments.iter())
            .filter(|(_, cluster)| chosen.contains(*cluster))
            .map(|(p, _)| p.clone())
            .collect();

        if kept.is_empty() {
            tracing::warn!(passages = total, "Cluster filter selected nothing, keeping all passages");
            return Ok(passages);
        }

        Ok(kept)
    }
}

/// Group members per cluster id, skipping ids with no members.
fn build_clusters(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    question: &[f32],
) -> Vec<Cluster> {
    (0..k)
        .filter_map(|id| {
            let members: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(_, a)| **a == id)
                .map(|(i, _)| i)
                .collect();
            if members.is_empty() {
                return None;
            }

            let dimension = vectors[members[0]].len();
            let mut centroid = vec![0.0f32; dimension];
            for &m in &members {
                for (c, v) in centroid.iter_mut().zip(vectors[m].iter()) {
                    *c += v;
                }
            }
            for c in centroid.iter_mut() {
                *c /= members.len() as f32;
            }

            let similarity = dot(&centroid, question);
            Some(Cluster {
                id,
                members,
                centroid,
                similarity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{passage, FixedEmbedder};
    use crate::embeddings::MockEmbedder;

    fn filter_with(embedder: Arc<dyn Embedder>) -> ClusterFilter {
        ClusterFilter::new(embedder, PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_small_sets_returned_unchanged() {
        let filter = filter_with(Arc::new(MockEmbedder::new(32)));

        for n in 0..4 {
            let passages: Vec<Passage> = (0..n)
                .map(|i| passage(&format!("passage number {}", i), "a.md", 0.5))
                .collect();
            let out = filter.filter("question", passages.clone()).await.unwrap();
            assert_eq!(out, passages);
        }
    }

    #[tokio::test]
    async fn test_off_topic_cluster_dropped() {
        let embedder = FixedEmbedder::new(4)
            .with("What is the refund window?", &[1.0, 0.0, 0.0, 0.0])
            .with("refund window one", &[1.0, 0.0, 0.2, 0.0])
            .with("refund window two", &[1.0, 0.0, 0.25, 0.0])
            .with("refund cancel one", &[1.0, 0.0, 0.0, 0.2])
            .with("refund cancel two", &[1.0, 0.0, 0.0, 0.25])
            .with("shipping", &[0.0, 1.0, 0.0, 0.0]);
        let filter = filter_with(Arc::new(embedder));

        let passages = vec![
            passage("refund window one", "refunds.md", 0.8),
            passage("shipping", "shipping.md", 0.6),
            passage("refund cancel one", "refunds.md", 0.8),
            passage("shipping", "shipping.md", 0.6),
            passage("refund window two", "refunds.md", 0.8),
            passage("shipping", "shipping.md", 0.6),
            passage("refund cancel two", "refunds.md", 0.8),
            passage("shipping", "shipping.md", 0.6),
        ];

        let kept = filter.filter("What is the refund window?", passages).await.unwrap();

        assert_eq!(kept.len(), 4);
        assert!(kept.iter().all(|p| p.source == "refunds.md"));
    }

    #[tokio::test]
    async fn test_degenerate_clusters_keep_evidence() {
        // Four identical passages: k-means leaves one cluster empty
        let filter = filter_with(Arc::new(MockEmbedder::new(32)));
        let passages = vec![passage("same refund text", "a.md", 0.7); 4];

        let kept = filter.filter("refund", passages.clone()).await.unwrap();
        assert_eq!(kept, passages);
    }

    #[tokio::test]
    async fn test_empty_selection_keeps_all_passages() {
        let settings = PipelineConfig {
            selected_clusters: 0,
            ..PipelineConfig::default()
        };
        let filter = ClusterFilter::new(Arc::new(MockEmbedder::new(64)), settings);
        let passages = vec![
            passage("refund policy thirty days", "refunds.md", 0.8),
            passage("shipping courier tracking", "shipping.md", 0.4),
            passage("refund policy card", "refunds.md", 0.7),
            passage("shipping courier abroad", "shipping.md", 0.3),
            passage("account deletion steps", "account.md", 0.2),
        ];

        let kept = filter.filter("refund policy", passages.clone()).await.unwrap();
        assert_eq!(kept, passages);
    }

    #[tokio::test]
    async fn test_two_clusters_both_selected() {
        // 4..=7 passages use two clusters and both are kept
        let filter = filter_with(Arc::new(MockEmbedder::new(64)));
        let passages = vec![
            passage("refund policy thirty days", "refunds.md", 0.8),
            passage("refund policy card", "refunds.md", 0.8),
            passage("shipping courier tracking", "shipping.md", 0.4),
            passage("shipping courier abroad", "shipping.md", 0.4),
            passage("shipping courier delays", "shipping.md", 0.4),
        ];

        let kept = filter.filter("refund policy", passages.clone()).await.unwrap();
        assert_eq!(kept.len(), passages.len());
    }

    #[test]
    fn test_build_clusters_skips_empty_ids() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let clusters = build_clusters(&vectors, &[0, 0], 3, &[1.0, 0.0]);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1]);
        assert!((clusters[0].centroid[0] - 0.5).abs() < 1e-6);
        assert!((clusters[0].similarity - 0.5).abs() < 1e-6);
    }
}
