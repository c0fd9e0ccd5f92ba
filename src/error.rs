//! Error type of the end-to-end pipeline.

use thiserror::Error;

/// Any failure between batch validation and the evaluation report.
#[derive(Debug, Error)]
pub enum Error {
    /// Batch bookkeeping error.
    #[error(transparent)]
    Core(#[from] egoflow_core::Error),

    /// Model construction or forward pass error.
    #[error(transparent)]
    Model(#[from] egoflow_nn::Error),

    /// Clustering or scoring error.
    #[error(transparent)]
    Eval(#[from] egoflow_eval::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Embeddings do not match the batch they were computed from.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
