//! Run configuration.
//!
//! One [`PipelineConfig`] is built per run (usually from JSON) and passed by
//! reference to everything that needs it.
//!
//! ```json
//! {
//!   "model": { "hidden_dim": 64, "num_timesteps": 20, "num_nodes": 400, "variant": "gcn_attention" },
//!   "clustering": { "em_iterations": 100, "target": "final_timestep" },
//!   "group_id_channel": 2
//! }
//! ```

use std::path::Path;

use egoflow_core::ModelConfig;
use egoflow_eval::{ClusterTarget, ClusteringConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Model, clustering and ground-truth settings of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub clustering: ClusteringConfig,
    /// Channel of the raw positions holding each node's group id
    /// (default: 2, after the two coordinates).
    pub group_id_channel: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(ModelConfig::default(), ClusteringConfig::default())
    }
}

impl PipelineConfig {
    pub fn new(model: ModelConfig, clustering: ClusteringConfig) -> Self {
        Self {
            model,
            clustering,
            group_id_channel: 2,
        }
    }

    pub fn with_group_id_channel(mut self, channel: usize) -> Self {
        self.group_id_channel = channel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.clustering.validate()?;
        if let ClusterTarget::Timestep(t) = self.clustering.target {
            if t >= self.model.num_timesteps {
                return Err(Error::InvalidConfig(format!(
                    "cluster timestep {t} outside 0..{}",
                    self.model.num_timesteps
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
