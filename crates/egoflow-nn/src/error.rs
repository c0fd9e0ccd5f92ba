//! Error types for egoflow-nn.

use thiserror::Error;

/// Errors raised while building or running a model.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Batch bookkeeping error (shape, graph or placeholder).
    #[error(transparent)]
    Core(#[from] egoflow_core::Error),

    /// Host array could not be reshaped.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Dimension mismatch between a batch and the model it is fed to.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn ensure_dim(context: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            context,
            expected,
            got,
        })
    }
}
