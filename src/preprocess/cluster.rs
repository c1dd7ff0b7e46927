//! Seeded k-means used for viewpoint clustering.

use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// K-means configuration. `k` is clamped to the number of points.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// Fitted clustering: one centroid row per cluster and a cluster index per
/// input point.
#[derive(Debug)]
pub struct KMeansResult {
    pub centroids: Array2<f64>,
    pub assignments: Vec<usize>,
}

impl KMeans {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            max_iterations: 100,
            seed,
        }
    }

    /// Run Lloyd's algorithm on the given points (one row per point).
    ///
    /// Initialization samples `k` distinct rows with a seeded generator, so
    /// the same seed and input always yield the same clustering. Empty
    /// clusters keep their previous centroid.
    pub fn fit(&self, points: &Array2<f64>) -> KMeansResult {
        let n = points.nrows();
        let dims = points.ncols();
        let k = self.k.min(n).max(1);

        if n == 0 {
            return KMeansResult {
                centroids: Array2::zeros((0, dims)),
                assignments: Vec::new(),
            };
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let mut centroids = Array2::zeros((k, dims));
        for (cluster, &i) in indices.iter().take(k).enumerate() {
            centroids.row_mut(cluster).assign(&points.row(i));
        }

        let mut assignments = vec![0usize; n];
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for i in 0..n {
                let best = nearest_row(points.row(i), &centroids);
                if assignments[i] != best {
                    assignments[i] = best;
                    changed = true;
                }
            }

            let mut sums = Array2::<f64>::zeros((k, dims));
            let mut counts = vec![0usize; k];
            for i in 0..n {
                let cluster = assignments[i];
                let mut row = sums.row_mut(cluster);
                row += &points.row(i);
                counts[cluster] += 1;
            }
            for cluster in 0..k {
                if counts[cluster] > 0 {
                    let mean = &sums.row(cluster) / counts[cluster] as f64;
                    centroids.row_mut(cluster).assign(&mean);
                }
            }

            if !changed {
                break;
            }
        }

        KMeansResult {
            centroids,
            assignments,
        }
    }
}

/// Index of the row in `rows` closest to `target` in squared euclidean
/// distance.
pub fn nearest_row(target: ArrayView1<f64>, rows: &Array2<f64>) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, row) in rows.rows().into_iter().enumerate() {
        let distance = squared_distance(target, row);
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_separates_distant_groups() {
        let points = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ];

        let result = KMeans::new(2, 42).fit(&points);
        assert_eq!(result.assignments.len(), 6);

        let first = result.assignments[0];
        let second = result.assignments[3];
        assert_ne!(first, second);
        assert!(result.assignments[..3].iter().all(|&a| a == first));
        assert!(result.assignments[3..].iter().all(|&a| a == second));
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let points = array![
            [1.0, 2.0],
            [2.0, 1.0],
            [8.0, 9.0],
            [9.0, 8.0],
            [5.0, 5.0],
        ];

        let a = KMeans::new(2, 7).fit(&points);
        let b = KMeans::new(2, 7).fit(&points);
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.centroids, b.centroids);
    }

    #[test]
    fn test_fit_clamps_k_to_point_count() {
        let points = array![[1.0, 1.0], [2.0, 2.0]];
        let result = KMeans::new(16, 42).fit(&points);
        assert_eq!(result.centroids.nrows(), 2);
    }

    #[test]
    fn test_nearest_row() {
        let rows = array![[0.0, 0.0], [5.0, 5.0], [10.0, 0.0]];
        assert_eq!(nearest_row(array![4.9, 5.2].view(), &rows), 1);
        assert_eq!(nearest_row(array![9.0, 1.0].view(), &rows), 2);
    }
}
