//! Masked graph convolution and temporal aggregation for dynamic ego-graphs.
//!
//! The learned half of the pipeline. Batch geometry, masking and the
//! scatter arena come from `egoflow-core`; this crate runs [`candle_core`]
//! operators on the compacted active subgraph of each timestep and then
//! aggregates the padded sequence over time.
//!
//! # Models
//!
//! | Variant | Per timestep | Across time | Head |
//! |---------|--------------|-------------|------|
//! | `GcnLstm` | 2 x GCN | LSTM | 2 x linear |
//! | `GcnAttention` | 2 x GCN | multi-head self-attention | 2 x linear |
//! | `GcnOnly` | 2 x GCN | - | linear |
//! | `LstmOnly` | - | LSTM | linear, masked |
//! | `GcnGru` | 1 x GCN | GRU on active slots | linear |
//!
//! # Example
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use egoflow_nn::{DynamicGraphModel, ParameterStore, TemporalEmbedder};
//!
//! let store = ParameterStore::fresh();
//! let model = DynamicGraphModel::new(&config, store.var_builder(&Device::Cpu))?;
//! let embeddings = model.embed(&batch)?; // (B, N, T, output_dim)
//! ```

pub mod checkpoint;
pub mod conv;
pub mod error;
pub mod model;
pub mod temporal;
pub mod tensor;

pub use checkpoint::ParameterStore;
pub use conv::{GCNConv, GcnStack};
pub use error::{Error, Result};
pub use model::{
    encode_timesteps, ConvTemporalModel, DynamicGraphModel, EncodedSequence, GcnGruModel,
    GcnOnlyModel, LstmOnlyModel, StepSummary, TemporalEmbedder,
};
pub use tensor::{array2_to_tensor, array3_to_tensor, tensor_to_array2, tensor_to_array3, tensor_to_array4};
pub use temporal::{
    positional_encoding, AttentionAggregator, FeedForwardHead, RecurrentAggregator,
    TemporalAggregator,
};
