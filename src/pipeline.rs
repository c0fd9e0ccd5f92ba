//! Forward pass, embedding selection and clustering evaluation.
//!
//! ```text
//! DynamicBatch --model--> (B, N, T, out) --select(target)--> samples per instance
//!                                                               |
//!                         positions[b][0, :, group_id_channel] -> truth
//!                                                               |
//!                                            GMM + best permutation -> InstanceReport
//! ```

use candle_core::{Device, Tensor};
use egoflow_core::{densify_labels, flat_index, DynamicBatch, EgoMask};
use egoflow_eval::{ClusterTarget, EvaluationReport, InstanceReport};
use egoflow_nn::{tensor_to_array4, DynamicGraphModel, ParameterStore};
use ndarray::{s, Array2, ArrayView4, Axis};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

/// Embeddings of one instance selected for clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    /// Node index within the instance of each sample row.
    pub nodes: Vec<usize>,
    /// `(n, width)` sample matrix.
    pub samples: Array2<f64>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Pick the clustering samples of `instance` from `(B, N, T, out)` embeddings.
///
/// - `FinalTimestep` / `Timestep(t)`: nodes active at that timestep, one
///   `out`-wide row each.
/// - `Flattened`: nodes active at any timestep, all `T` rows concatenated.
pub fn select_samples(
    embeddings: ArrayView4<'_, f32>,
    mask: &EgoMask,
    instance: usize,
    target: ClusterTarget,
) -> Result<SampleSet> {
    let (b, n, t, width) = embeddings.dim();
    for (context, expected, got) in [
        ("embedding batch", mask.batch_size(), b),
        ("embedding nodes", mask.nodes(), n),
        ("embedding timesteps", mask.timesteps(), t),
    ] {
        if expected != got {
            return Err(Error::DimensionMismatch {
                context,
                expected,
                got,
            });
        }
    }
    if instance >= b {
        return Err(Error::DimensionMismatch {
            context: "instance index",
            expected: b,
            got: instance + 1,
        });
    }

    let per_instance = embeddings.index_axis(Axis(0), instance);
    let timestep = match target {
        ClusterTarget::FinalTimestep => Some(t.saturating_sub(1)),
        ClusterTarget::Timestep(ts) if ts < t => Some(ts),
        ClusterTarget::Timestep(ts) => {
            return Err(egoflow_core::Error::TimestepOutOfRange {
                timestep: ts,
                timesteps: t,
            }
            .into())
        }
        ClusterTarget::Flattened => None,
    };

    let (nodes, samples) = match timestep {
        Some(ts) => {
            let nodes: Vec<usize> = (0..n).filter(|&node| mask.is_active(instance, ts, node)).collect();
            let rows = per_instance.slice(s![.., ts, ..]).select(Axis(0), &nodes);
            (nodes, rows.mapv(f64::from))
        }
        None => {
            let nodes: Vec<usize> = (0..n)
                .filter(|&node| (0..t).any(|ts| mask.is_active(instance, ts, node)))
                .collect();
            let samples = Array2::from_shape_fn((nodes.len(), t * width), |(row, col)| {
                f64::from(per_instance[[nodes[row], col / width, col % width]])
            });
            (nodes, samples)
        }
    };
    Ok(SampleSet { nodes, samples })
}

/// Cluster and score precomputed `(B, N, T, out)` embeddings of `batch`.
///
/// Instances with no eligible sample are left out of the report.
pub fn evaluate_embeddings(
    embeddings: &Tensor,
    batch: &DynamicBatch,
    config: &PipelineConfig,
) -> Result<EvaluationReport> {
    let embeddings = tensor_to_array4(embeddings)?;
    let dims = batch.dims();
    let mut instances = Vec::with_capacity(dims.batch);

    for b in 0..dims.batch {
        let selected = select_samples(embeddings.view(), batch.ego_mask(), b, config.clustering.target)?;
        if selected.is_empty() {
            warn!(instance = b, "no active nodes at the clustering target, skipping instance");
            continue;
        }

        let ids = batch.group_ids(b, config.group_id_channel)?;
        let raw: Vec<i64> = selected.nodes.iter().map(|&node| ids[node]).collect();
        let (truth, _) = densify_labels(&raw);
        let slots = selected
            .nodes
            .iter()
            .map(|&node| flat_index(b, node, dims.nodes))
            .collect();

        let report = InstanceReport::evaluate(
            b,
            slots,
            selected.samples.view(),
            truth,
            &config.clustering,
        )?;
        instances.push(report);
    }

    let report = EvaluationReport::from_instances(instances);
    info!(
        instances = report.instances.len(),
        samples = report.total_samples(),
        mean_accuracy = report.mean_accuracy,
        "evaluated batch"
    );
    Ok(report)
}

/// A configured model ready to embed and evaluate batches.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    model: DynamicGraphModel,
}

impl Pipeline {
    /// Validate `config` and build its model from `store`.
    pub fn new(config: PipelineConfig, store: &ParameterStore, device: &Device) -> Result<Self> {
        config.validate()?;
        let model = DynamicGraphModel::new(&config.model, store.var_builder(device))?;
        info!(variant = config.model.variant.label(), "pipeline ready");
        Ok(Self { config, model })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &DynamicGraphModel {
        &self.model
    }

    /// `(B, N, T, output_dim)` embeddings.
    pub fn embed(&self, batch: &DynamicBatch) -> Result<Tensor> {
        Ok(self.model.forward(batch)?)
    }

    /// Embed `batch` and score every instance.
    pub fn evaluate(&self, batch: &DynamicBatch) -> Result<EvaluationReport> {
        let embeddings = self.embed(batch)?;
        evaluate_embeddings(&embeddings, batch, &self.config)
    }
}

/// One-shot helper: embed `batch` with `model` and evaluate it.
pub fn evaluate_batch(
    model: &DynamicGraphModel,
    batch: &DynamicBatch,
    config: &PipelineConfig,
) -> Result<EvaluationReport> {
    let embeddings = model.forward(batch)?;
    evaluate_embeddings(&embeddings, batch, config)
}
