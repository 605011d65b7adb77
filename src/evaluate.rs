// src/evaluate.rs

use anyhow::{bail, Result};
use log::warn;
use ndarray::Array2;

/// Distance used by the evaluator. The trainer always evaluates under
/// squared Euclidean distance; plain Euclidean is kept for ad-hoc use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMeasure {
    SquaredEuclidean,
    Euclidean,
}

impl DistanceMeasure {
    fn compute(&self, a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
        let squared: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        match self {
            DistanceMeasure::SquaredEuclidean => squared,
            DistanceMeasure::Euclidean => squared.sqrt(),
        }
    }
}

/// Computes the mean silhouette coefficient over all rows.
///
/// For each row, `a` is the mean distance to the other members of its
/// cluster and `b` the smallest mean distance to any other cluster;
/// the coefficient is `(b - a) / max(a, b)`. Rows in singleton clusters
/// contribute 0. The result lies in [-1, 1].
pub struct ClusteringEvaluator {
    distance: DistanceMeasure,
}

impl ClusteringEvaluator {
    pub fn new(distance: DistanceMeasure) -> Self {
        Self { distance }
    }

    pub fn distance(&self) -> DistanceMeasure {
        self.distance
    }

    pub fn evaluate(&self, features: &Array2<f64>, labels: &[usize]) -> Result<f64> {
        let n = features.nrows();
        if n == 0 {
            bail!("Cannot evaluate an empty dataset");
        }
        if labels.len() != n {
            bail!(
                "Label count {} does not match row count {}",
                labels.len(),
                n
            );
        }

        let k = labels.iter().max().copied().unwrap_or(0) + 1;
        let mut cluster_sizes = vec![0usize; k];
        for &label in labels {
            cluster_sizes[label] += 1;
        }
        if cluster_sizes.iter().filter(|size| **size > 0).count() <= 1 {
            warn!("All rows fell into a single cluster; silhouette is undefined, returning 0");
            return Ok(0.0);
        }

        let mut total = 0.0;
        for i in 0..n {
            let label_i = labels[i];
            if cluster_sizes[label_i] == 1 {
                continue; // singleton, contributes 0
            }

            let mut cluster_dists = vec![0.0f64; k];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dist = self.distance.compute(features.row(i), features.row(j));
                cluster_dists[labels[j]] += dist;
            }

            let a = cluster_dists[label_i] / (cluster_sizes[label_i] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != label_i && cluster_sizes[c] > 0)
                .map(|c| cluster_dists[c] / cluster_sizes[c] as f64)
                .fold(f64::MAX, f64::min);

            if a.max(b) > 0.0 {
                total += (b - a) / a.max(b);
            }
        }

        Ok(total / n as f64)
    }
}

impl Default for ClusteringEvaluator {
    fn default() -> Self {
        Self::new(DistanceMeasure::SquaredEuclidean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_well_separated_clusters_score_high() {
        let features = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let score = ClusteringEvaluator::default()
            .evaluate(&features, &labels)
            .unwrap();
        assert!(score > 0.9, "score was {}", score);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_bad_assignment_scores_low() {
        let features = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [10.0, 10.0],
            [10.1, 10.0],
        ];
        // Each "cluster" straddles both blobs.
        let labels = vec![0, 1, 0, 1];
        let score = ClusteringEvaluator::default()
            .evaluate(&features, &labels)
            .unwrap();
        assert!(score < 0.0, "score was {}", score);
    }

    #[test]
    fn test_single_cluster_returns_zero() {
        let features = array![[0.0, 0.0], [1.0, 1.0]];
        let score = ClusteringEvaluator::default()
            .evaluate(&features, &[0, 0])
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_label_mismatch_is_an_error() {
        let features = array![[0.0, 0.0], [1.0, 1.0]];
        let result = ClusteringEvaluator::default().evaluate(&features, &[0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_euclidean_and_squared_agree_on_ordering() {
        let features = array![
            [0.0, 0.0],
            [0.2, 0.0],
            [5.0, 5.0],
            [5.2, 5.0],
        ];
        let labels = vec![0, 0, 1, 1];
        let squared = ClusteringEvaluator::new(DistanceMeasure::SquaredEuclidean)
            .evaluate(&features, &labels)
            .unwrap();
        let euclidean = ClusteringEvaluator::new(DistanceMeasure::Euclidean)
            .evaluate(&features, &labels)
            .unwrap();
        assert!(squared > 0.5);
        assert!(euclidean > 0.5);
    }
}
