//! Error types for egoflow-core.

use thiserror::Error;

/// Errors raised while validating or slicing a dynamic graph batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Two tensors disagree on a shared dimension.
    #[error("shape mismatch in {tensor}: expected {dim} = {expected}, got {got}")]
    ShapeMismatch {
        tensor: &'static str,
        dim: &'static str,
        expected: usize,
        got: usize,
    },

    /// An edge references a node outside the active subgraph.
    #[error("invalid graph: edge ({src}, {dst}) outside 0..{n_active}")]
    InvalidGraph {
        src: usize,
        dst: usize,
        n_active: usize,
    },

    /// A placeholder row was written twice in one run.
    #[error("placeholder timestep {0} already written")]
    TimestepAlreadyWritten(usize),

    /// Timestep index beyond the batch horizon.
    #[error("timestep {timestep} out of range (T = {timesteps})")]
    TimestepOutOfRange { timestep: usize, timesteps: usize },

    /// Invalid configuration value.
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

impl Error {
    pub(crate) fn shape(tensor: &'static str, dim: &'static str, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            tensor,
            dim,
            expected,
            got,
        }
    }
}

/// Fail with [`Error::ShapeMismatch`] unless `got == expected`.
pub(crate) fn ensure_dim(
    tensor: &'static str,
    dim: &'static str,
    expected: usize,
    got: usize,
) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::shape(tensor, dim, expected, got))
    }
}
