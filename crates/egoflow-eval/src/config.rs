//! Clustering configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which embeddings of a slot become one clustering sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterTarget {
    /// Embedding at the last timestep; slots active there.
    #[default]
    FinalTimestep,
    /// Embedding at a fixed timestep; slots active there.
    Timestep(usize),
    /// All timesteps concatenated; slots active at any timestep.
    Flattened,
}

/// EM and k-means settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// EM iterations, run unconditionally (default: 100).
    pub em_iterations: usize,
    /// Added to every covariance diagonal (default: 1e-6).
    pub regularization: f64,
    /// Lloyd iterations cap for the k-means seed (default: 300).
    pub kmeans_max_iterations: usize,
    /// k-means stops once the squared center shift falls below this (default: 1e-4).
    pub kmeans_tolerance: f64,
    /// k-means++ seed (default: 42).
    pub seed: u64,
    /// Embedding selection (default: final timestep).
    pub target: ClusterTarget,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            em_iterations: 100,
            regularization: 1e-6,
            kmeans_max_iterations: 300,
            kmeans_tolerance: 1e-4,
            seed: 42,
            target: ClusterTarget::default(),
        }
    }
}

impl ClusteringConfig {
    pub fn with_em_iterations(mut self, iterations: usize) -> Self {
        self.em_iterations = iterations;
        self
    }

    pub fn with_regularization(mut self, reg: f64) -> Self {
        self.regularization = reg;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_target(mut self, target: ClusterTarget) -> Self {
        self.target = target;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.regularization > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "regularization must be positive, got {}",
                self.regularization
            )));
        }
        if self.kmeans_max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "kmeans_max_iterations must be positive".into(),
            ));
        }
        if self.kmeans_tolerance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "kmeans_tolerance must be non-negative, got {}",
                self.kmeans_tolerance
            )));
        }
        Ok(())
    }
}
