//! Unsupervised evaluation of node embeddings.
//!
//! Embeddings of one graph instance are clustered with a full-covariance
//! Gaussian mixture (k-means++ seed, fixed EM iterations) and the clusters
//! are scored against ground-truth groups by best-permutation accuracy.
//!
//! ```rust,ignore
//! use egoflow_eval::{ClusteringConfig, InstanceReport};
//!
//! let report = InstanceReport::evaluate(0, slots, samples.view(), truth, &ClusteringConfig::default())?;
//! println!("{:.3}", report.accuracy);
//! ```
//!
//! # Modules
//!
//! - [`kmeans`]: k-means++ seeding and Lloyd iterations
//! - [`mixture`]: [`GaussianMixture`] and EM
//! - [`permutation`]: exhaustive relabeling search
//! - [`report`]: per-instance and batch reports

pub mod config;
pub mod error;
pub mod kmeans;
pub mod mixture;
pub mod permutation;
pub mod report;

pub use config::{ClusterTarget, ClusteringConfig};
pub use error::{Error, Result};
pub use kmeans::{kmeans, KMeansFit};
pub use mixture::{Component, GaussianMixture, MixtureFit};
pub use permutation::{best_permutation, nth_arrangement, PermutationScore, MAX_PERMUTATION_LABELS};
pub use report::{EvaluationReport, InstanceReport};
