//! Seeded K-means over embedding vectors
//!
//! Lloyd iterations with K-means++ initialisation and squared Euclidean
//! distance. A fixed seed makes the partition reproducible for identical
//! input. Empty clusters are a legal outcome: their slot keeps its previous
//! centroid and simply ends up with no members.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Assignment of every input vector to a cluster in `0..k`
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster index per input vector, same order as the input
    pub assignments: Vec<usize>,

    /// Number of clusters actually used (input `k` clamped to the point count)
    pub k: usize,

    /// Lloyd iterations performed
    pub iterations: usize,
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(vector, centroid);
        // Strict comparison: ties go to the lowest index
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

fn initialize_centroids(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..vectors.len()));

    while chosen.len() < k {
        let distances: Vec<f32> = vectors
            .iter()
            .map(|v| {
                chosen
                    .iter()
                    .map(|&c| squared_distance(v, &vectors[c]))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect();
        let total: f32 = distances.iter().sum();

        let next = if total > f32::EPSILON {
            let target = rng.gen::<f32>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (i, &d) in distances.iter().enumerate() {
                cumulative += d;
                if d > 0.0 && cumulative >= target {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave the target just past the last bucket
            pick.or_else(|| distances.iter().rposition(|&d| d > 0.0))
        } else {
            None
        };

        // Every point coincides with a chosen centroid: take the next unused
        // index. Its cluster may end up empty.
        let next = next.unwrap_or_else(|| {
            (0..vectors.len())
                .find(|i| !chosen.contains(i))
                .unwrap_or(0)
        });
        chosen.push(next);
    }

    chosen.into_iter().map(|i| vectors[i].clone()).collect()
}

fn update_centroids(vectors: &[Vec<f32>], assignments: &[usize], previous: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut sums = vec![vec![0.0f32; dimension]; previous.len()];
    let mut sizes = vec![0usize; previous.len()];

    for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
        for (sum, value) in sums[cluster].iter_mut().zip(vector.iter()) {
            *sum += value;
        }
        sizes[cluster] += 1;
    }

    sums.into_iter()
        .zip(sizes)
        .zip(previous.iter())
        .map(|((mut sum, size), old)| {
            if size == 0 {
                old.clone()
            } else {
                for value in sum.iter_mut() {
                    *value /= size as f32;
                }
                sum
            }
        })
        .collect()
}

/// Partition `vectors` into `k` clusters.
///
/// `k` is clamped to `1..=vectors.len()`. All vectors must share one dimension.
pub fn kmeans(vectors: &[Vec<f32>], k: usize, seed: u64, max_iterations: usize) -> KMeansResult {
    if vectors.is_empty() {
        return KMeansResult {
            assignments: Vec::new(),
            k: 0,
            iterations: 0,
        };
    }

    let k = k.clamp(1, vectors.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initialize_centroids(vectors, k, &mut rng);
    let mut assignments: Vec<usize> = vectors.iter().map(|v| nearest(v, &centroids)).collect();
    let mut iterations = 1;

    while iterations < max_iterations.max(1) {
        centroids = update_centroids(vectors, &assignments, &centroids);
        let next: Vec<usize> = vectors.iter().map(|v| nearest(v, &centroids)).collect();
        iterations += 1;

        if next == assignments {
            break;
        }
        assignments = next;
    }

    KMeansResult {
        assignments,
        k,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0],
            vec![0.95, 0.05],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
            vec![0.05, 0.95],
            vec![0.1, 0.9],
        ]
    }

    #[test]
    fn test_separates_two_blobs() {
        let result = kmeans(&two_blobs(), 2, 42, 300);

        assert_eq!(result.k, 2);
        assert_eq!(result.assignments[0], result.assignments[1]);
        assert_eq!(result.assignments[1], result.assignments[2]);
        assert_eq!(result.assignments[3], result.assignments[4]);
        assert_eq!(result.assignments[4], result.assignments[5]);
        assert_ne!(result.assignments[0], result.assignments[3]);
    }

    #[test]
    fn test_same_seed_same_partition() {
        let vectors = two_blobs();
        assert_eq!(kmeans(&vectors, 3, 7, 300), kmeans(&vectors, 3, 7, 300));
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let vectors = vec![vec![0.5, 0.5]; 4];
        let result = kmeans(&vectors, 2, 42, 300);

        assert_eq!(result.assignments.len(), 4);
        assert!(result.assignments.iter().all(|&a| a < 2));
        // All points coincide, so they share one cluster and the other is empty
        assert!(result.assignments.iter().all(|&a| a == result.assignments[0]));
    }

    #[test]
    fn test_k_clamped_to_point_count() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let result = kmeans(&vectors, 5, 42, 300);
        assert_eq!(result.k, 2);
    }

    #[test]
    fn test_empty_input() {
        let result = kmeans(&[], 3, 42, 300);
        assert!(result.assignments.is_empty());
        assert_eq!(result.k, 0);
    }
}
