//! Bookkeeping for batched dynamic graphs.
//!
//! `egoflow-core` owns everything that happens before and after a graph
//! operator touches the data: validating batch geometry, flattening the
//! ego-mask, carving out the active subgraph of a timestep, and scattering
//! results back into a fixed-size padded arena.
//!
//! # Layout contract
//!
//! Slot `n` of instance `b` always lives at flat index `b * N + n`, in the
//! mask, the features and the adjacency alike, at every timestep.
//!
//! ```text
//! ego_mask (B, T, N) --flatten--> (T, B*N)
//!                                    |
//!           features[t], adjacency[t] + row t
//!                                    |
//!                                 extract --> ActiveSubgraph { indices, features, edges }
//!                                                  |
//!                                            graph operator
//!                                                  |
//!                                 EmbeddingPlaceholder::write(t, indices, rows)
//! ```
//!
//! # Modules
//!
//! - [`batch`]: [`DynamicBatch`] and episode collation
//! - [`mask`]: [`EgoMask`] and its flat form
//! - [`subgraph`]: per-timestep active subgraph and [`EdgeIndex`]
//! - [`placeholder`]: padded arena
//! - [`config`]: [`ModelConfig`]

pub mod batch;
pub mod config;
pub mod error;
pub mod mask;
pub mod placeholder;
pub mod subgraph;

pub use batch::{densify_labels, BatchDims, DynamicBatch, GraphEpisode};
pub use config::{ModelConfig, ModelVariant};
pub use error::{Error, Result};
pub use mask::{flat_index, EgoMask, FlatMask};
pub use placeholder::EmbeddingPlaceholder;
pub use subgraph::{extract, extract_timestep, ActiveSubgraph, EdgeIndex};
