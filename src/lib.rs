//! `egoflow`: temporal node embeddings for dynamic ego-graphs.
//!
//! A batch of graph episodes, each a sequence of snapshots in which nodes
//! appear and disappear, is embedded by a masked graph convolution per
//! timestep followed by a temporal model. The embeddings are then clustered
//! per instance and scored against known group ids.
//!
//! This crate is the facade over three members:
//!
//! - [`egoflow_core`]: batch geometry, ego-masks, active-subgraph
//!   extraction and the scatter arena
//! - [`egoflow_nn`]: GCN layers, temporal aggregators, model variants
//!   and parameter storage
//! - [`egoflow_eval`]: k-means, Gaussian mixture EM and
//!   best-permutation accuracy
//!
//! # Example
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use egoflow::{DynamicBatch, ParameterStore, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_json_file("run.json")?;
//! let store = ParameterStore::load("model.safetensors", &Device::Cpu)?;
//! let pipeline = Pipeline::new(config, &store, &Device::Cpu)?;
//!
//! let batch = DynamicBatch::collate(&episodes, pipeline.config().model.input_dim)?;
//! let report = pipeline.evaluate(&batch)?;
//! println!("{}", report.summary());
//! ```
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod config;
pub mod error;
pub mod pipeline;

pub use egoflow_core;
pub use egoflow_eval;
pub use egoflow_nn;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{evaluate_batch, evaluate_embeddings, select_samples, Pipeline, SampleSet};

pub use egoflow_core::{DynamicBatch, EgoMask, GraphEpisode, ModelConfig, ModelVariant};
pub use egoflow_eval::{ClusterTarget, ClusteringConfig, EvaluationReport, InstanceReport};
pub use egoflow_nn::{DynamicGraphModel, ParameterStore, TemporalEmbedder};
