//! Per-instance and aggregate evaluation results.

use ndarray::ArrayView2;
use serde::Serialize;
use tracing::debug;

use crate::config::ClusteringConfig;
use crate::error::{Error, Result};
use crate::mixture::GaussianMixture;
use crate::permutation::best_permutation;

/// Clustering outcome for one graph instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceReport {
    /// Position of the instance in its batch.
    pub instance: usize,
    /// Flat slot index of each evaluated sample.
    pub slots: Vec<usize>,
    /// Dense ground-truth label per sample.
    pub truth: Vec<usize>,
    /// Mixture label per sample, before relabeling.
    pub predicted: Vec<usize>,
    /// Predicted labels in ground-truth order.
    pub remapped: Vec<usize>,
    /// Entry `p` is the truth label assigned to cluster `p`.
    pub permutation: Vec<usize>,
    /// Number of mixture components.
    pub clusters: usize,
    /// Best-permutation accuracy in `[0, 1]`.
    pub accuracy: f64,
}

impl InstanceReport {
    /// Cluster `samples` into as many components as there are distinct
    /// truth labels and score the result.
    ///
    /// # Arguments
    /// - `instance`: index of the instance in its batch
    /// - `slots`: flat slot index of each sample row
    /// - `samples`: `(n, D)` embeddings
    /// - `truth`: dense label per sample
    pub fn evaluate(
        instance: usize,
        slots: Vec<usize>,
        samples: ArrayView2<'_, f64>,
        truth: Vec<usize>,
        config: &ClusteringConfig,
    ) -> Result<Self> {
        let n = samples.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        for (context, got) in [("truth labels", truth.len()), ("sample slots", slots.len())] {
            if got != n {
                return Err(Error::ShapeMismatch {
                    context,
                    expected: n,
                    got,
                });
            }
        }

        let mut distinct = truth.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let k = distinct.len();

        let fit = GaussianMixture::fit(samples, k, config)?;
        let score = best_permutation(&truth, &fit.labels, k)?;
        debug!(instance, samples = n, clusters = k, accuracy = score.accuracy, "scored instance");

        Ok(Self {
            instance,
            slots,
            truth,
            predicted: fit.labels,
            remapped: score.remapped,
            permutation: score.permutation,
            clusters: k,
            accuracy: score.accuracy,
        })
    }
}

/// Results for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub instances: Vec<InstanceReport>,
    /// Unweighted mean of the per-instance accuracies.
    pub mean_accuracy: f64,
}

impl EvaluationReport {
    pub fn from_instances(instances: Vec<InstanceReport>) -> Self {
        let mean_accuracy = if instances.is_empty() {
            0.0
        } else {
            instances.iter().map(|r| r.accuracy).sum::<f64>() / instances.len() as f64
        };
        Self {
            instances,
            mean_accuracy,
        }
    }

    /// Concatenate reports of several batches and recompute the mean.
    pub fn merge(reports: Vec<Self>) -> Self {
        Self::from_instances(reports.into_iter().flat_map(|r| r.instances).collect())
    }

    pub fn total_samples(&self) -> usize {
        self.instances.iter().map(|r| r.truth.len()).sum()
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        let (min, max) = self
            .instances
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r.accuracy), hi.max(r.accuracy))
            });
        if self.instances.is_empty() {
            return "accuracy: n/a (n=0)".to_string();
        }
        format!(
            "accuracy: {:.4} | min: {:.4} | max: {:.4} (instances={}, samples={})",
            self.mean_accuracy,
            min,
            max,
            self.instances.len(),
            self.total_samples()
        )
    }
}
