// K-means over RGB vectors.
//
// Greedy k-means++ seeding followed by Lloyd refinement, repeated `n_init`
// times from one seeded RNG; the run with the lowest inertia is returned.

use crate::core::color::RgbColor;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ClusterError {
    #[error("Nothing to cluster: no input vectors")]
    Empty,

    #[error("Cluster count must be at least 1")]
    NoClusters,

    #[error("Cluster count {k} exceeds the number of items ({n})")]
    TooManyClusters { k: usize, n: usize },

    #[error("Vector {index} has a non-finite component")]
    NonFinite { index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clustering {
    /// Cluster index for each input vector, in input order.
    pub labels: Vec<usize>,
    pub centroids: Vec<RgbColor>,
    /// Sum of squared distances from each vector to its centroid.
    pub inertia: f64,
    /// Lloyd iterations used by the winning run.
    pub n_iter: usize,
}

impl Clustering {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

/// Partitions vectors into `k` groups.
///
/// Implementations must be deterministic for a given `seed`.
pub trait VectorClusterer {
    fn cluster(
        &self,
        vectors: &[RgbColor],
        k: usize,
        seed: u64,
    ) -> Result<Clustering, ClusterError>;
}

#[derive(Debug, Clone)]
pub struct KMeans {
    n_init: usize,
    max_iter: usize,
    tol: f64,
}

impl KMeans {
    pub fn new() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
        }
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol.max(0.0);
        self
    }

    pub fn n_init(&self) -> usize {
        self.n_init
    }

    fn single_run(
        &self,
        points: &[RgbColor],
        k: usize,
        tol: f64,
        rng: &mut ChaCha8Rng,
    ) -> Clustering {
        let mut centroids = init_plus_plus(points, k, rng);
        let mut labels = vec![0; points.len()];
        let mut distances = vec![0.0; points.len()];
        let mut n_iter = 0;

        for iter in 0..self.max_iter {
            n_iter = iter + 1;
            assign(points, &centroids, &mut labels, &mut distances);
            let updated = recompute_centroids(points, &labels, &distances, k);

            let shift: f64 = centroids
                .iter()
                .zip(updated.iter())
                .map(|(old, new)| old.distance_squared(new))
                .sum();
            centroids = updated;

            if shift <= tol {
                break;
            }
        }

        // Labels must agree with the centroids actually returned.
        let inertia = assign(points, &centroids, &mut labels, &mut distances);
        Clustering {
            labels,
            centroids,
            inertia,
            n_iter,
        }
    }
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorClusterer for KMeans {
    fn cluster(
        &self,
        vectors: &[RgbColor],
        k: usize,
        seed: u64,
    ) -> Result<Clustering, ClusterError> {
        let n = vectors.len();
        if n == 0 {
            return Err(ClusterError::Empty);
        }
        if k == 0 {
            return Err(ClusterError::NoClusters);
        }
        if k > n {
            return Err(ClusterError::TooManyClusters { k, n });
        }
        if let Some(index) = vectors.iter().position(|v| !v.is_finite()) {
            return Err(ClusterError::NonFinite { index });
        }

        let tol = self.tol * mean_variance(vectors);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut best: Option<Clustering> = None;

        for run in 0..self.n_init {
            let result = self.single_run(vectors, k, tol, &mut rng);
            log::debug!(
                "k-means run {}: inertia {:.6} after {} iteration(s)",
                run,
                result.inertia,
                result.n_iter
            );
            let better = best
                .as_ref()
                .map(|b| result.inertia < b.inertia)
                .unwrap_or(true);
            if better {
                best = Some(result);
            }
        }

        // n_init is clamped to at least 1, so a run always happened.
        best.ok_or(ClusterError::Empty)
    }
}

/// Index of the closest centroid and the squared distance to it. Ties go to
/// the lower index.
pub fn nearest_centroid(point: &RgbColor, centroids: &[RgbColor]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let d = point.distance_squared(centroid);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn assign(
    points: &[RgbColor],
    centroids: &[RgbColor],
    labels: &mut [usize],
    distances: &mut [f64],
) -> f64 {
    let mut inertia = 0.0;
    for (i, point) in points.iter().enumerate() {
        let (label, d) = nearest_centroid(point, centroids);
        labels[i] = label;
        distances[i] = d;
        inertia += d;
    }
    inertia
}

fn recompute_centroids(
    points: &[RgbColor],
    labels: &[usize],
    distances: &[f64],
    k: usize,
) -> Vec<RgbColor> {
    let mut sums = vec![[0.0f64; 3]; k];
    let mut counts = vec![0usize; k];
    for (point, &label) in points.iter().zip(labels) {
        for (s, c) in sums[label].iter_mut().zip(point.0) {
            *s += c;
        }
        counts[label] += 1;
    }

    let mut centroids: Vec<RgbColor> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            if count == 0 {
                RgbColor([0.0; 3])
            } else {
                RgbColor(sum.map(|s| s / count as f64))
            }
        })
        .collect();

    // Empty clusters take over the points currently farthest from their centroid.
    let empty: Vec<usize> = (0..k).filter(|&c| counts[c] == 0).collect();
    if !empty.is_empty() {
        let mut by_distance: Vec<usize> = (0..points.len()).collect();
        by_distance.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]).then(a.cmp(&b)));
        for (cluster, &point) in empty.iter().zip(by_distance.iter().cycle()) {
            centroids[*cluster] = points[point];
        }
    }

    centroids
}

fn init_plus_plus(points: &[RgbColor], k: usize, rng: &mut ChaCha8Rng) -> Vec<RgbColor> {
    let n = points.len();
    let n_local_trials = 2 + (k as f64).ln().floor() as usize;

    let first = points[rng.gen_range(0..n)];
    let mut centroids = vec![first];
    let mut closest: Vec<f64> = points.iter().map(|p| p.distance_squared(&first)).collect();
    let mut potential: f64 = closest.iter().sum();

    while centroids.len() < k {
        let mut best: Option<(usize, Vec<f64>, f64)> = None;

        for _ in 0..n_local_trials {
            let candidate = if potential > 0.0 {
                sample_weighted(&closest, potential, rng)
            } else {
                rng.gen_range(0..n)
            };

            let updated: Vec<f64> = points
                .iter()
                .zip(&closest)
                .map(|(p, &d)| d.min(p.distance_squared(&points[candidate])))
                .collect();
            let candidate_potential: f64 = updated.iter().sum();

            let better = best
                .as_ref()
                .map(|(_, _, pot)| candidate_potential < *pot)
                .unwrap_or(true);
            if better {
                best = Some((candidate, updated, candidate_potential));
            }
        }

        if let Some((index, updated, pot)) = best {
            centroids.push(points[index]);
            closest = updated;
            potential = pot;
        }
    }

    centroids
}

/// Draw an index with probability proportional to `weights[i]`.
fn sample_weighted(weights: &[f64], total: f64, rng: &mut ChaCha8Rng) -> usize {
    let target = rng.gen_range(0.0..1.0) * total;
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > target {
            return i;
        }
    }
    // Rounding can leave target at the very end; take the last weighted point.
    weights.iter().rposition(|&w| w > 0.0).unwrap_or(weights.len() - 1)
}

fn mean_variance(points: &[RgbColor]) -> f64 {
    let n = points.len() as f64;
    let mut mean = [0.0f64; 3];
    for p in points {
        for (m, c) in mean.iter_mut().zip(p.0) {
            *m += c / n;
        }
    }
    let mut variance = 0.0;
    for p in points {
        for (m, c) in mean.iter().zip(p.0) {
            variance += (c - m) * (c - m);
        }
    }
    variance / n / 3.0
}
