//! Error types for egoflow-eval.

use thiserror::Error;

/// Errors raised while clustering embeddings or scoring a labeling.
#[derive(Debug, Error)]
pub enum Error {
    /// `K == 0` or more clusters than samples.
    #[error("cannot fit {k} clusters to {samples} samples")]
    DegenerateClusterCount { k: usize, samples: usize },

    /// Two inputs disagree on a length.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// A predicted label is not below the declared cluster count.
    #[error("label {label} out of range for {bound} clusters")]
    LabelOutOfRange { label: usize, bound: usize },

    /// Nothing to cluster or score.
    #[error("empty input")]
    EmptyInput,

    /// Exhaustive relabeling would enumerate `labels!` permutations.
    #[error("permutation search over {labels} labels exceeds the limit of {max}")]
    PermutationSearchTooLarge { labels: usize, max: usize },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
