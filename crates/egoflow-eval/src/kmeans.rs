//! k-means with k-means++ seeding.
//!
//! Only used to seed the Gaussian mixture, so it stays small: Euclidean
//! distance, Lloyd iterations, one deterministic restart.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use tracing::debug;

use crate::error::{Error, Result};

/// Result of a k-means run.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// `(K, D)` centers.
    pub centers: Array2<f64>,
    /// Nearest center per sample.
    pub labels: Vec<usize>,
    /// Lloyd iterations performed.
    pub iterations: usize,
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(sample: ArrayView1<'_, f64>, centers: &Array2<f64>) -> (usize, f64) {
    centers
        .outer_iter()
        .enumerate()
        .map(|(c, center)| (c, squared_distance(sample, center)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ initial centers: the first uniformly, each next with
/// probability proportional to its squared distance to the closest chosen
/// center.
pub fn plus_plus_init(data: ArrayView2<'_, f64>, k: usize, rng: &mut XorShiftRng) -> Array2<f64> {
    let n = data.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut dist: Vec<f64> = data
        .outer_iter()
        .map(|row| squared_distance(row, data.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = n - 1;
            for (i, &d) in dist.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // every remaining sample coincides with a center
            rng.gen_range(0..n)
        };
        chosen.push(next);
        for (i, row) in data.outer_iter().enumerate() {
            dist[i] = dist[i].min(squared_distance(row, data.row(next)));
        }
    }

    data.select(Axis(0), &chosen)
}

/// Fit `k` centers to the rows of `data`.
///
/// Stops after `max_iterations` or once the summed squared center shift is
/// below `tolerance`. A center that loses all its samples stays put.
pub fn kmeans(
    data: ArrayView2<'_, f64>,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
) -> Result<KMeansFit> {
    let (n, d) = data.dim();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    if k == 0 || k > n {
        return Err(Error::DegenerateClusterCount { k, samples: n });
    }

    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut centers = plus_plus_init(data, k, &mut rng);
    let mut labels = vec![0usize; n];
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        for (i, row) in data.outer_iter().enumerate() {
            labels[i] = nearest(row, &centers).0;
        }

        let mut sums = Array2::<f64>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (row, &c) in data.outer_iter().zip(&labels) {
            let mut acc = sums.row_mut(c);
            acc += &row;
            counts[c] += 1;
        }

        let mut shift = 0.0;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let updated: Array1<f64> = sums.row(c).mapv(|v| v / counts[c] as f64);
            shift += squared_distance(updated.view(), centers.row(c));
            centers.row_mut(c).assign(&updated);
        }
        if shift < tolerance {
            break;
        }
    }

    for (i, row) in data.outer_iter().enumerate() {
        labels[i] = nearest(row, &centers).0;
    }
    debug!(k, samples = n, iterations, "k-means converged");
    Ok(KMeansFit {
        centers,
        labels,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn separates_two_obvious_groups() {
        let data = array![[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [10.0, 10.0], [10.1, 10.0], [10.0, 10.1]];
        let fit = kmeans(data.view(), 2, 100, 1e-9, 42).unwrap();
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[1], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_eq!(fit.labels[4], fit.labels[5]);
        assert_ne!(fit.labels[0], fit.labels[3]);
    }

    #[test]
    fn same_seed_same_result() {
        let data = Array2::from_shape_fn((30, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let a = kmeans(data.view(), 3, 50, 1e-6, 7).unwrap();
        let b = kmeans(data.view(), 3, 50, 1e-6, 7).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.centers, b.centers);
    }

    #[test]
    fn duplicate_points_still_yield_k_centers() {
        let data = Array2::<f64>::ones((4, 2));
        let fit = kmeans(data.view(), 3, 10, 1e-6, 1).unwrap();
        assert_eq!(fit.centers.nrows(), 3);
        assert!(fit.labels.iter().all(|&l| l < 3));
    }

    #[test]
    fn degenerate_k_rejected() {
        let data = Array2::<f64>::zeros((2, 2));
        assert!(matches!(
            kmeans(data.view(), 0, 10, 1e-6, 1),
            Err(Error::DegenerateClusterCount { k: 0, samples: 2 })
        ));
        assert!(matches!(
            kmeans(data.view(), 3, 10, 1e-6, 1),
            Err(Error::DegenerateClusterCount { k: 3, samples: 2 })
        ));
        assert!(matches!(
            kmeans(Array2::<f64>::zeros((0, 2)).view(), 1, 10, 1e-6, 1),
            Err(Error::EmptyInput)
        ));
    }
}
