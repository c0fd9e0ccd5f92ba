//! Full-covariance Gaussian mixture fitted by EM.
//!
//! The mixture is seeded from a k-means partition and then runs a fixed
//! number of EM iterations with no convergence test.
//!
//! - **E-step**: `r[i, k] = w_k N(x_i | mu_k, S_k) / sum_j w_j N(x_i | mu_j, S_j)`,
//!   evaluated in log space with log-sum-exp.
//! - **M-step**: responsibility-weighted mean and covariance, `reg * I` on
//!   the diagonal, prior = mass fraction.
//!
//! A component with zero responsibility mass is left untouched for that
//! iteration. So is one whose updated covariance still fails Cholesky after
//! regularization.

use nalgebra::{linalg::Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array2, ArrayView1, ArrayView2};
use tracing::{debug, warn};

use crate::config::ClusteringConfig;
use crate::error::{Error, Result};
use crate::kmeans::kmeans;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// One mixture component.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub weight: f64,
}

/// A fitted or seeded mixture.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    components: Vec<Component>,
    regularization: f64,
}

/// Labels and parameters after EM.
#[derive(Debug, Clone)]
pub struct MixtureFit {
    /// Argmax-responsibility label per sample.
    pub labels: Vec<usize>,
    pub model: GaussianMixture,
}

fn to_vector(row: ArrayView1<'_, f64>) -> DVector<f64> {
    DVector::from_iterator(row.len(), row.iter().copied())
}

fn regularize(mut covariance: DMatrix<f64>, reg: f64) -> DMatrix<f64> {
    for i in 0..covariance.nrows() {
        covariance[(i, i)] += reg;
    }
    covariance
}

struct Factor {
    cholesky: Cholesky<f64, Dyn>,
    log_det: f64,
}

impl Factor {
    fn new(covariance: &DMatrix<f64>) -> Option<Self> {
        let cholesky = Cholesky::new(covariance.clone())?;
        let log_det = 2.0 * cholesky.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        Some(Self { cholesky, log_det })
    }

    fn log_density(&self, mean: &DVector<f64>, x: &DVector<f64>) -> f64 {
        let diff = x - mean;
        let mahalanobis = diff.dot(&self.cholesky.solve(&diff));
        -0.5 * (diff.len() as f64 * LN_2PI + self.log_det + mahalanobis)
    }
}

impl GaussianMixture {
    /// Build from explicit components.
    pub fn from_parts(components: Vec<Component>, regularization: f64) -> Result<Self> {
        let dim = components
            .first()
            .map(|c| c.mean.len())
            .ok_or(Error::EmptyInput)?;
        for c in &components {
            if c.mean.len() != dim {
                return Err(Error::ShapeMismatch {
                    context: "component mean",
                    expected: dim,
                    got: c.mean.len(),
                });
            }
            if c.covariance.shape() != (dim, dim) {
                return Err(Error::ShapeMismatch {
                    context: "component covariance",
                    expected: dim,
                    got: c.covariance.nrows(),
                });
            }
        }
        Ok(Self {
            components,
            regularization,
        })
    }

    /// Seed from a hard partition.
    ///
    /// Mean and unbiased covariance (`n - 1` denominator) of each cluster,
    /// plus `reg * I`; prior is the cluster's sample fraction. A cluster with
    /// fewer than two samples starts at `reg * I`, and an empty one is
    /// centered on the overall mean with zero prior.
    pub fn from_assignments(
        data: ArrayView2<'_, f64>,
        labels: &[usize],
        k: usize,
        regularization: f64,
    ) -> Result<Self> {
        let (n, d) = data.dim();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if k == 0 || k > n {
            return Err(Error::DegenerateClusterCount { k, samples: n });
        }
        if labels.len() != n {
            return Err(Error::ShapeMismatch {
                context: "assignments",
                expected: n,
                got: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= k) {
            return Err(Error::LabelOutOfRange { label, bound: k });
        }

        let samples: Vec<DVector<f64>> = data.outer_iter().map(to_vector).collect();
        let overall = samples.iter().fold(DVector::zeros(d), |acc, x| acc + x) / n as f64;

        let components = (0..k)
            .map(|c| {
                let members: Vec<&DVector<f64>> = samples
                    .iter()
                    .zip(labels)
                    .filter(|(_, &l)| l == c)
                    .map(|(x, _)| x)
                    .collect();
                let count = members.len();
                let mean = if count == 0 {
                    overall.clone()
                } else {
                    members.iter().fold(DVector::zeros(d), |acc, x| acc + *x) / count as f64
                };
                let mut covariance = DMatrix::zeros(d, d);
                if count >= 2 {
                    for x in &members {
                        let diff = *x - &mean;
                        covariance.ger(1.0, &diff, &diff, 1.0);
                    }
                    covariance /= (count - 1) as f64;
                }
                Component {
                    mean,
                    covariance: regularize(covariance, regularization),
                    weight: count as f64 / n as f64,
                }
            })
            .collect();

        Ok(Self {
            components,
            regularization,
        })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn dim(&self) -> usize {
        self.components.first().map_or(0, |c| c.mean.len())
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// True iff every covariance admits a Cholesky factorization.
    pub fn is_positive_definite(&self) -> bool {
        self.components
            .iter()
            .all(|c| Cholesky::new(c.covariance.clone()).is_some())
    }

    fn check_dim(&self, data: ArrayView2<'_, f64>) -> Result<()> {
        if data.ncols() == self.dim() {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                context: "samples",
                expected: self.dim(),
                got: data.ncols(),
            })
        }
    }

    /// `(n, K)` responsibilities; each row sums to one.
    pub fn e_step(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_dim(data)?;
        let k = self.n_components();
        let factors: Vec<Option<Factor>> = self
            .components
            .iter()
            .map(|c| Factor::new(&c.covariance))
            .collect();

        let mut resp = Array2::<f64>::zeros((data.nrows(), k));
        let mut log_p = vec![f64::NEG_INFINITY; k];
        for (i, row) in data.outer_iter().enumerate() {
            let x = to_vector(row);
            for (j, (c, factor)) in self.components.iter().zip(&factors).enumerate() {
                log_p[j] = match factor {
                    Some(f) if c.weight > 0.0 => c.weight.ln() + f.log_density(&c.mean, &x),
                    _ => f64::NEG_INFINITY,
                };
            }

            let max = log_p.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max == f64::NEG_INFINITY {
                resp.row_mut(i).fill(1.0 / k as f64);
                continue;
            }
            let lse = max + log_p.iter().map(|lp| (lp - max).exp()).sum::<f64>().ln();
            for j in 0..k {
                resp[[i, j]] = (log_p[j] - lse).exp();
            }
        }
        Ok(resp)
    }

    /// Re-estimate every component with non-zero mass from `resp`.
    pub fn m_step(&mut self, data: ArrayView2<'_, f64>, resp: &Array2<f64>) -> Result<()> {
        self.check_dim(data)?;
        let (n, d) = data.dim();
        if resp.dim() != (n, self.n_components()) {
            return Err(Error::ShapeMismatch {
                context: "responsibilities",
                expected: n,
                got: resp.nrows(),
            });
        }
        let samples: Vec<DVector<f64>> = data.outer_iter().map(to_vector).collect();

        for (k, component) in self.components.iter_mut().enumerate() {
            let weights = resp.column(k);
            let mass: f64 = weights.sum();
            if mass <= 0.0 {
                debug!(cluster = k, "zero responsibility mass, component frozen");
                continue;
            }

            let mean = samples
                .iter()
                .zip(weights.iter())
                .fold(DVector::zeros(d), |acc, (x, &r)| acc + x * r)
                / mass;
            let mut covariance = DMatrix::zeros(d, d);
            for (x, &r) in samples.iter().zip(weights.iter()) {
                let diff = x - &mean;
                covariance.ger(r, &diff, &diff, 1.0);
            }
            covariance /= mass;
            let covariance = regularize(covariance, self.regularization);

            if Cholesky::new(covariance.clone()).is_none() {
                warn!(cluster = k, mass, "covariance singular after regularization, component frozen");
                continue;
            }
            component.mean = mean;
            component.covariance = covariance;
            component.weight = mass / n as f64;
        }
        Ok(())
    }

    /// Run `iterations` EM rounds in place.
    pub fn run(&mut self, data: ArrayView2<'_, f64>, iterations: usize) -> Result<()> {
        for _ in 0..iterations {
            let resp = self.e_step(data)?;
            self.m_step(data, &resp)?;
        }
        Ok(())
    }

    /// Argmax-responsibility label per sample; ties go to the lower index.
    pub fn predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let resp = self.e_step(data)?;
        Ok(resp
            .outer_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (j, &r)| if r > best.1 { (j, r) } else { best })
                    .0
            })
            .collect())
    }

    /// k-means seed followed by EM.
    pub fn fit(data: ArrayView2<'_, f64>, k: usize, config: &ClusteringConfig) -> Result<MixtureFit> {
        config.validate()?;
        let seed = kmeans(
            data,
            k,
            config.kmeans_max_iterations,
            config.kmeans_tolerance,
            config.seed,
        )?;
        Self::fit_from_assignments(data, &seed.labels, k, config)
    }

    /// EM seeded from an arbitrary hard partition.
    pub fn fit_from_assignments(
        data: ArrayView2<'_, f64>,
        labels: &[usize],
        k: usize,
        config: &ClusteringConfig,
    ) -> Result<MixtureFit> {
        let mut model = Self::from_assignments(data, labels, k, config.regularization)?;
        model.run(data, config.em_iterations)?;
        let labels = model.predict(data)?;
        debug!(k, samples = data.nrows(), iterations = config.em_iterations, "EM finished");
        Ok(MixtureFit { labels, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> Array2<f64> {
        // three tight groups of four
        let centers = [[0.0, 0.0], [8.0, 0.0], [0.0, 8.0]];
        let offsets = [[0.1, 0.2], [-0.2, 0.1], [0.15, -0.1], [-0.05, -0.2]];
        Array2::from_shape_fn((12, 2), |(i, j)| centers[i / 4][j] + offsets[i % 4][j])
    }

    #[test]
    fn initial_covariance_is_unbiased() {
        let data = array![[0.0, 0.0], [2.0, 0.0], [10.0, 10.0]];
        let gm = GaussianMixture::from_assignments(data.view(), &[0, 0, 1], 2, 1e-6).unwrap();
        let c0 = &gm.components()[0];
        assert!((c0.mean[0] - 1.0).abs() < 1e-12);
        // sum of squares 2 over n - 1 = 1
        assert!((c0.covariance[(0, 0)] - (2.0 + 1e-6)).abs() < 1e-12);
        assert!((c0.weight - 2.0 / 3.0).abs() < 1e-12);
        // singleton starts at reg * I
        let c1 = &gm.components()[1];
        assert_eq!(c1.covariance, DMatrix::identity(2, 2) * 1e-6);
    }

    #[test]
    fn responsibilities_sum_to_one() {
        let data = blobs();
        let labels: Vec<usize> = (0..12).map(|i| i / 4).collect();
        let gm = GaussianMixture::from_assignments(data.view(), &labels, 3, 1e-6).unwrap();
        let resp = gm.e_step(data.view()).unwrap();
        for row in resp.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn covariance_positive_definite_after_every_m_step() {
        let data = blobs();
        let labels: Vec<usize> = (0..12).map(|i| i / 4).collect();
        let mut gm = GaussianMixture::from_assignments(data.view(), &labels, 3, 1e-6).unwrap();
        for _ in 0..20 {
            let resp = gm.e_step(data.view()).unwrap();
            gm.m_step(data.view(), &resp).unwrap();
            assert!(gm.is_positive_definite());
        }
    }

    #[test]
    fn fit_recovers_blobs() {
        let data = blobs();
        let fit = GaussianMixture::fit(data.view(), 3, &ClusteringConfig::default()).unwrap();
        for g in 0..3 {
            let group = &fit.labels[g * 4..g * 4 + 4];
            assert!(group.iter().all(|&l| l == group[0]));
        }
        assert_ne!(fit.labels[0], fit.labels[4]);
        assert_ne!(fit.labels[4], fit.labels[8]);
        assert_ne!(fit.labels[0], fit.labels[8]);
    }

    #[test]
    fn zero_mass_component_is_frozen() {
        let data = array![[0.0, 0.0], [0.5, 0.0], [0.0, 0.5], [0.5, 0.5]];
        let near = Component {
            mean: DVector::from_vec(vec![0.25, 0.25]),
            covariance: DMatrix::identity(2, 2),
            weight: 0.5,
        };
        let far = Component {
            mean: DVector::from_vec(vec![1e4, 1e4]),
            covariance: DMatrix::identity(2, 2) * 1e-3,
            weight: 0.5,
        };
        let mut gm = GaussianMixture::from_parts(vec![near, far.clone()], 1e-6).unwrap();
        gm.run(data.view(), 3).unwrap();
        assert_eq!(gm.components()[1], far);
        assert_eq!(gm.predict(data.view()).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn degenerate_cluster_count_rejected() {
        let data = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            GaussianMixture::fit(data.view(), 0, &ClusteringConfig::default()),
            Err(Error::DegenerateClusterCount { k: 0, samples: 3 })
        ));
        assert!(matches!(
            GaussianMixture::fit(data.view(), 4, &ClusteringConfig::default()),
            Err(Error::DegenerateClusterCount { k: 4, samples: 3 })
        ));
    }

    #[test]
    fn identical_points_stay_positive_definite() {
        let data = Array2::<f64>::ones((5, 3));
        let fit = GaussianMixture::fit(data.view(), 2, &ClusteringConfig::default()).unwrap();
        assert!(fit.model.is_positive_definite());
        assert_eq!(fit.labels.len(), 5);
    }
}
