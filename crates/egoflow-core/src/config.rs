//! Model configuration.
//!
//! A [`ModelConfig`] is created once per run and passed by reference into
//! model construction. Nothing in the workspace reads configuration from
//! global state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which timestep-embedding / temporal-aggregation strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Two GCN layers per timestep, LSTM across time, two-layer head.
    GcnLstm,
    /// Two GCN layers per timestep, multi-head self-attention across time, two-layer head.
    GcnAttention,
    /// Two GCN layers per timestep and a linear head; no temporal model.
    GcnOnly,
    /// LSTM over raw node features; no graph convolution.
    LstmOnly,
    /// One GCN layer feeding a GRU cell that only advances active nodes.
    GcnGru,
}

impl ModelVariant {
    pub fn label(&self) -> &'static str {
        match self {
            Self::GcnLstm => "gcn_lstm",
            Self::GcnAttention => "gcn_attention",
            Self::GcnOnly => "gcn_only",
            Self::LstmOnly => "lstm_only",
            Self::GcnGru => "gcn_gru",
        }
    }
}

/// Model sizing and batch geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Feature channels fed to the first layer (default: 2).
    pub input_dim: usize,
    /// GCN / sequence hidden width (default: 64).
    pub hidden_dim: usize,
    /// Width of the first feed-forward layer of the head (default: 32).
    pub hidden_dim_2: usize,
    /// Embedding width produced by the model (default: 16).
    pub output_dim: usize,
    /// Attention heads; only read by [`ModelVariant::GcnAttention`] (default: 4).
    pub num_heads: usize,
    /// Timesteps per episode (default: 20).
    pub num_timesteps: usize,
    /// Padded node capacity per instance (default: 400).
    pub num_nodes: usize,
    /// Nominal number of instances per batch (default: 4).
    pub batch_size: usize,
    /// Strategy to build (default: GCN + LSTM).
    pub variant: ModelVariant,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_dim: 2,
            hidden_dim: 64,
            hidden_dim_2: 32,
            output_dim: 16,
            num_heads: 4,
            num_timesteps: 20,
            num_nodes: 400,
            batch_size: 4,
            variant: ModelVariant::GcnLstm,
        }
    }
}

impl ModelConfig {
    pub fn with_input_dim(mut self, dim: usize) -> Self {
        self.input_dim = dim;
        self
    }

    pub fn with_hidden_dims(mut self, hidden: usize, hidden_2: usize) -> Self {
        self.hidden_dim = hidden;
        self.hidden_dim_2 = hidden_2;
        self
    }

    pub fn with_output_dim(mut self, dim: usize) -> Self {
        self.output_dim = dim;
        self
    }

    pub fn with_num_heads(mut self, heads: usize) -> Self {
        self.num_heads = heads;
        self
    }

    pub fn with_geometry(mut self, batch_size: usize, num_timesteps: usize, num_nodes: usize) -> Self {
        self.batch_size = batch_size;
        self.num_timesteps = num_timesteps;
        self.num_nodes = num_nodes;
        self
    }

    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Check that every size is positive and the attention heads divide the hidden width.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("input_dim", self.input_dim),
            ("hidden_dim", self.hidden_dim),
            ("hidden_dim_2", self.hidden_dim_2),
            ("output_dim", self.output_dim),
            ("num_heads", self.num_heads),
            ("num_timesteps", self.num_timesteps),
            ("num_nodes", self.num_nodes),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.variant == ModelVariant::GcnAttention && self.hidden_dim % self.num_heads != 0 {
            return Err(Error::InvalidConfig(format!(
                "hidden_dim {} is not divisible by num_heads {}",
                self.hidden_dim, self.num_heads
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}
