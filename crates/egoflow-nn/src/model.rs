//! Dynamic-graph embedding models.
//!
//! Every variant consumes a [`DynamicBatch`] and produces per-node,
//! per-timestep embeddings of shape `(B, N, T, output_dim)`. The
//! convolutional variants share one encoding loop ([`encode_timesteps`]):
//!
//! ```text
//! for t in 0..T:
//!     sub = extract(t)                    # active rows, remapped edges
//!     if sub is empty: leave row t zero   # skipped
//!     h = operator(sub.features, sub.edges)
//!     placeholder.write(t, sub.indices, h)
//! ```
//!
//! The operator never sees padding. Everything after the loop works on the
//! full padded `(T, B*N, H)` sequence.

use candle_core::{Device, Tensor};
use candle_nn::rnn::{gru, lstm, GRUConfig, GRUState, LSTMConfig, GRU, LSTM, RNN};
use candle_nn::{linear, Linear, Module, VarBuilder};
use egoflow_core::{
    extract_timestep, DynamicBatch, EdgeIndex, EmbeddingPlaceholder, ModelConfig, ModelVariant,
};
use ndarray::{Array2, Array3, Axis};
use tracing::{debug, instrument};

use crate::conv::{GCNConv, GcnStack};
use crate::error::{ensure_dim, Error, Result};
use crate::temporal::{AttentionAggregator, FeedForwardHead, RecurrentAggregator, TemporalAggregator};
use crate::tensor::{array2_to_tensor, array3_to_tensor, tensor_to_array2};

/// Per-timestep record of the encoding loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSummary {
    pub timestep: usize,
    pub n_active: usize,
    pub n_edges: usize,
}

/// Output of the encoding loop: the filled arena and what each timestep saw.
#[derive(Debug, Clone)]
pub struct EncodedSequence {
    pub placeholder: EmbeddingPlaceholder,
    /// One entry per timestep that had at least one active slot.
    pub steps: Vec<StepSummary>,
}

/// Run `operator` on the active subgraph of every timestep and scatter the
/// results into a `(T, B*N, width)` placeholder.
///
/// Timesteps with no active slot are skipped and stay zero.
pub fn encode_timesteps<F>(
    batch: &DynamicBatch,
    width: usize,
    device: &Device,
    mut operator: F,
) -> Result<EncodedSequence>
where
    F: FnMut(&Tensor, &EdgeIndex) -> Result<Tensor>,
{
    let dims = batch.dims();
    let flat = batch.flat_mask();
    let mut placeholder = EmbeddingPlaceholder::zeros(dims.timesteps, dims.slots(), width);
    let mut steps = Vec::with_capacity(dims.timesteps);

    for t in 0..dims.timesteps {
        let sub = extract_timestep(batch, &flat, t)?;
        if sub.is_empty() {
            debug!(timestep = t, "no active slots, skipping");
            continue;
        }
        let x = array2_to_tensor(sub.features.view(), device)?;
        let h = operator(&x, &sub.edges)?;
        let rows = tensor_to_array2(&h)?;
        placeholder.write_subgraph(&sub, rows.view())?;

        let step = StepSummary {
            timestep: t,
            n_active: sub.n_active(),
            n_edges: sub.edges.len(),
        };
        debug!(
            timestep = step.timestep,
            n_active = step.n_active,
            n_edges = step.n_edges,
            "encoded timestep"
        );
        steps.push(step);
    }

    Ok(EncodedSequence { placeholder, steps })
}

/// Common interface of the model variants.
pub trait TemporalEmbedder {
    /// `(B, N, T, output_dim)` embeddings for `batch`.
    fn embed(&self, batch: &DynamicBatch) -> Result<Tensor>;

    fn config(&self) -> &ModelConfig;

    /// Device holding the parameters; activations are built here too.
    fn device(&self) -> &Device;
}

fn check_batch(config: &ModelConfig, batch: &DynamicBatch) -> Result<()> {
    let dims = batch.dims();
    ensure_dim("batch timesteps", config.num_timesteps, dims.timesteps)?;
    ensure_dim("batch nodes", config.num_nodes, dims.nodes)?;
    ensure_dim("batch input_dim", config.input_dim, dims.input_dim)
}

/// `(T, B*N, W)` padded sequence to `(B, N, T, W)`.
fn time_major_to_output(seq: &Tensor, batch: usize, nodes: usize) -> Result<Tensor> {
    let (t, _, w) = seq.dims3()?;
    Ok(seq
        .reshape((t, batch, nodes, w))?
        .permute((1, 2, 0, 3))?
        .contiguous()?)
}

/// GCN stack per timestep, then a temporal aggregator and a two-layer head.
///
/// Parameters: `gcn1.*`, `gcn2.*`, `temporal.*`, `head.fc1.*`, `head.fc2.*`.
#[derive(Debug, Clone)]
pub struct ConvTemporalModel {
    config: ModelConfig,
    device: Device,
    stack: GcnStack,
    temporal: TemporalAggregator,
    head: FeedForwardHead,
}

impl ConvTemporalModel {
    pub fn new(config: &ModelConfig, temporal: TemporalAggregator, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            device: vb.device().clone(),
            stack: GcnStack::new(config.input_dim, config.hidden_dim, vb.clone())?,
            temporal,
            head: FeedForwardHead::new(
                config.hidden_dim,
                config.hidden_dim_2,
                config.output_dim,
                vb.pp("head"),
            )?,
        })
    }

    /// GCN + LSTM.
    pub fn recurrent(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let temporal = RecurrentAggregator::new(config.hidden_dim, vb.pp("temporal"))?;
        Self::new(config, TemporalAggregator::Recurrent(temporal), vb)
    }

    /// GCN + multi-head self-attention.
    pub fn attention(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let temporal =
            AttentionAggregator::new(config.hidden_dim, config.num_heads, vb.pp("temporal"))?;
        Self::new(config, TemporalAggregator::Attention(temporal), vb)
    }

    /// Spatial encoding only: the padded `(T, B*N, hidden)` arena.
    pub fn encode(&self, batch: &DynamicBatch) -> Result<EncodedSequence> {
        check_batch(&self.config, batch)?;
        encode_timesteps(batch, self.config.hidden_dim, &self.device, |x, edges| {
            self.stack.forward(x, edges)
        })
    }
}

impl TemporalEmbedder for ConvTemporalModel {
    fn embed(&self, batch: &DynamicBatch) -> Result<Tensor> {
        let device = &self.device;
        let dims = batch.dims();
        let encoded = self.encode(batch)?;

        // (T, B*N, H) -> (B*N, T, H)
        let seq = array3_to_tensor(encoded.placeholder.as_array().view(), device)?
            .transpose(0, 1)?
            .contiguous()?;
        let seq = self.temporal.forward(&seq)?;
        let seq = seq.reshape((dims.batch, dims.nodes, dims.timesteps, self.config.hidden_dim))?;
        self.head.forward(&seq)
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// GCN stack per timestep followed by a ReLU and a linear head.
///
/// Parameters: `gcn1.*`, `gcn2.*`, `fc.*`.
#[derive(Debug, Clone)]
pub struct GcnOnlyModel {
    config: ModelConfig,
    device: Device,
    stack: GcnStack,
    fc: Linear,
}

impl GcnOnlyModel {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            device: vb.device().clone(),
            stack: GcnStack::new(config.input_dim, config.hidden_dim, vb.clone())?,
            fc: linear(config.hidden_dim, config.output_dim, vb.pp("fc"))?,
        })
    }
}

impl TemporalEmbedder for GcnOnlyModel {
    fn embed(&self, batch: &DynamicBatch) -> Result<Tensor> {
        check_batch(&self.config, batch)?;
        let device = &self.device;
        let dims = batch.dims();
        let encoded = encode_timesteps(batch, self.config.output_dim, device, |x, edges| {
            let h = self.stack.forward(x, edges)?.relu()?;
            Ok(self.fc.forward(&h)?)
        })?;
        let seq = array3_to_tensor(encoded.placeholder.as_array().view(), device)?;
        time_major_to_output(&seq, dims.batch, dims.nodes)
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// LSTM over raw node features with a linear head; no graph operator.
///
/// Inactive `(slot, timestep)` positions are zeroed in the output.
/// Parameters: `lstm.*`, `fc.*`.
#[derive(Debug, Clone)]
pub struct LstmOnlyModel {
    config: ModelConfig,
    device: Device,
    lstm: LSTM,
    fc: Linear,
}

impl LstmOnlyModel {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            device: vb.device().clone(),
            lstm: lstm(
                config.input_dim,
                config.hidden_dim,
                LSTMConfig::default(),
                vb.pp("lstm"),
            )?,
            fc: linear(config.hidden_dim, config.output_dim, vb.pp("fc"))?,
        })
    }
}

impl TemporalEmbedder for LstmOnlyModel {
    fn embed(&self, batch: &DynamicBatch) -> Result<Tensor> {
        check_batch(&self.config, batch)?;
        let device = &self.device;
        let dims = batch.dims();

        // (T, B*N, D) -> (B*N, T, D)
        let seq = array3_to_tensor(batch.features().view(), device)?
            .transpose(0, 1)?
            .contiguous()?;
        let states = self.lstm.seq(&seq)?;
        let hidden = self.lstm.states_to_tensor(&states)?;
        let out = self
            .fc
            .forward(&hidden)?
            .reshape((dims.batch, dims.nodes, dims.timesteps, self.config.output_dim))?;

        // (B, T, N) mask -> (B, N, T, 1)
        let mask = batch
            .ego_mask()
            .as_array()
            .mapv(|on| if on { 1.0f32 } else { 0.0 });
        let mask = array3_to_tensor(mask.view(), device)?
            .transpose(1, 2)?
            .contiguous()?
            .unsqueeze(3)?;
        Ok(out.broadcast_mul(&mask)?)
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// One GCN layer feeding a GRU cell.
///
/// The hidden state of a slot only advances at timesteps where the slot is
/// active; otherwise it is carried forward unchanged. Parameters: `gcn.*`,
/// `gru.*`, `fc.*`.
#[derive(Debug, Clone)]
pub struct GcnGruModel {
    config: ModelConfig,
    device: Device,
    gcn: GCNConv,
    gru: GRU,
    fc: Linear,
}

impl GcnGruModel {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            device: vb.device().clone(),
            gcn: GCNConv::new(config.input_dim, config.hidden_dim, vb.pp("gcn"))?,
            gru: gru(
                config.hidden_dim,
                config.hidden_dim,
                GRUConfig::default(),
                vb.pp("gru"),
            )?,
            fc: linear(config.hidden_dim, config.output_dim, vb.pp("fc"))?,
        })
    }
}

impl TemporalEmbedder for GcnGruModel {
    fn embed(&self, batch: &DynamicBatch) -> Result<Tensor> {
        check_batch(&self.config, batch)?;
        let device = &self.device;
        let dims = batch.dims();
        let width = self.config.hidden_dim;
        let flat = batch.flat_mask();

        let mut hidden = Array2::<f32>::zeros((dims.slots(), width));
        let mut history = Array3::<f32>::zeros((dims.timesteps, dims.slots(), width));
        for t in 0..dims.timesteps {
            let sub = extract_timestep(batch, &flat, t)?;
            if !sub.is_empty() {
                let x = array2_to_tensor(sub.features.view(), device)?;
                let g = self.gcn.forward(&x, &sub.edges)?.relu()?;
                let prev = hidden.select(Axis(0), &sub.indices);
                let state = GRUState {
                    h: array2_to_tensor(prev.view(), device)?,
                };
                let next = self.gru.step(&g, &state)?;
                let next = tensor_to_array2(next.h())?;
                for (row, &slot) in next.outer_iter().zip(&sub.indices) {
                    hidden.row_mut(slot).assign(&row);
                }
            }
            history.index_axis_mut(Axis(0), t).assign(&hidden);
        }

        let seq = array3_to_tensor(history.view(), device)?;
        let out = self.fc.forward(&seq)?;
        time_major_to_output(&out, dims.batch, dims.nodes)
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// A model of any [`ModelVariant`], picked once at construction.
#[derive(Debug, Clone)]
pub enum DynamicGraphModel {
    GcnLstm(ConvTemporalModel),
    GcnAttention(ConvTemporalModel),
    GcnOnly(GcnOnlyModel),
    LstmOnly(LstmOnlyModel),
    GcnGru(GcnGruModel),
}

impl DynamicGraphModel {
    /// Validate `config` and build the variant it names.
    #[instrument(skip_all, fields(variant = config.variant.label()))]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let model = match config.variant {
            ModelVariant::GcnLstm => Self::GcnLstm(ConvTemporalModel::recurrent(config, vb)?),
            ModelVariant::GcnAttention => {
                Self::GcnAttention(ConvTemporalModel::attention(config, vb)?)
            }
            ModelVariant::GcnOnly => Self::GcnOnly(GcnOnlyModel::new(config, vb)?),
            ModelVariant::LstmOnly => Self::LstmOnly(LstmOnlyModel::new(config, vb)?),
            ModelVariant::GcnGru => Self::GcnGru(GcnGruModel::new(config, vb)?),
        };
        debug!(
            input_dim = config.input_dim,
            hidden_dim = config.hidden_dim,
            output_dim = config.output_dim,
            "built model"
        );
        Ok(model)
    }

    pub fn variant(&self) -> ModelVariant {
        self.config().variant
    }

    /// `(B, N, T, output_dim)` embeddings for `batch`.
    pub fn forward(&self, batch: &DynamicBatch) -> Result<Tensor> {
        self.inner().embed(batch)
    }

    fn inner(&self) -> &dyn TemporalEmbedder {
        match self {
            Self::GcnLstm(m) | Self::GcnAttention(m) => m,
            Self::GcnOnly(m) => m,
            Self::LstmOnly(m) => m,
            Self::GcnGru(m) => m,
        }
    }
}

impl TemporalEmbedder for DynamicGraphModel {
    fn embed(&self, batch: &DynamicBatch) -> Result<Tensor> {
        self.inner().embed(batch)
    }

    fn config(&self) -> &ModelConfig {
        self.inner().config()
    }

    fn device(&self) -> &Device {
        self.inner().device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;
    use egoflow_core::EgoMask;

    fn tiny_config(variant: ModelVariant) -> ModelConfig {
        ModelConfig::default()
            .with_input_dim(2)
            .with_hidden_dims(8, 4)
            .with_output_dim(3)
            .with_num_heads(2)
            .with_geometry(2, 3, 4)
            .with_variant(variant)
    }

    fn tiny_batch() -> DynamicBatch {
        let (b, t, n, d) = (2, 3, 4, 2);
        let mask = Array3::from_shape_fn((b, t, n), |(bi, ti, ni)| (bi + ti + ni) % 3 != 0);
        let features = Array3::from_shape_fn((t, b * n, d), |(ti, s, c)| {
            (ti * 10 + s + c) as f32 * 0.1
        });
        let adjacency = Array3::from_shape_fn((t, b * n, b * n), |(_, i, j)| {
            if i / n == j / n && i != j {
                1.0
            } else {
                0.0
            }
        });
        let positions = (0..b).map(|_| Array3::zeros((t, n, 3))).collect();
        DynamicBatch::new(positions, EgoMask::new(mask), features, adjacency).unwrap()
    }

    #[test]
    fn every_variant_produces_b_n_t_out() {
        for variant in [
            ModelVariant::GcnLstm,
            ModelVariant::GcnAttention,
            ModelVariant::GcnOnly,
            ModelVariant::LstmOnly,
            ModelVariant::GcnGru,
        ] {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
            let model = DynamicGraphModel::new(&tiny_config(variant), vb).unwrap();
            assert_eq!(model.variant(), variant);
            let out = model.embed(&tiny_batch()).unwrap();
            assert_eq!(out.dims(), &[2, 4, 3, 3], "{variant:?}");
            assert!(out.device().same_device(model.device()), "{variant:?}");
        }
    }

    #[test]
    fn geometry_mismatch_rejected() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = tiny_config(ModelVariant::GcnLstm).with_geometry(2, 5, 4);
        let model = DynamicGraphModel::new(&config, vb).unwrap();
        assert!(matches!(
            model.embed(&tiny_batch()),
            Err(Error::DimensionMismatch {
                context: "batch timesteps",
                expected: 5,
                got: 3
            })
        ));
    }

    #[test]
    fn invalid_config_rejected_before_building() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = tiny_config(ModelVariant::GcnAttention).with_num_heads(3);
        assert!(matches!(
            DynamicGraphModel::new(&config, vb),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn lstm_only_zeroes_inactive_positions() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = DynamicGraphModel::new(&tiny_config(ModelVariant::LstmOnly), vb).unwrap();
        let batch = tiny_batch();
        // flatten (B, N) so rows index slots
        let out = model
            .embed(&batch)
            .unwrap()
            .reshape((8, 3, 3))
            .unwrap()
            .to_vec3::<f32>()
            .unwrap();
        for bi in 0..2 {
            for ni in 0..4 {
                for ti in 0..3 {
                    if !batch.ego_mask().is_active(bi, ti, ni) {
                        assert!(out[bi * 4 + ni][ti].iter().all(|&v| v == 0.0));
                    }
                }
            }
        }
    }

    #[test]
    fn gru_hidden_state_carried_over_inactive_steps() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = tiny_config(ModelVariant::GcnGru).with_geometry(1, 3, 2);
        let model = DynamicGraphModel::new(&config, vb).unwrap();

        // slot 0 active at t = 0 only; slot 1 never active
        let mut mask = Array3::from_elem((1, 3, 2), false);
        mask[[0, 0, 0]] = true;
        let features = Array3::from_elem((3, 2, 2), 1.0f32);
        let batch = DynamicBatch::new(
            vec![Array3::zeros((3, 2, 3))],
            EgoMask::new(mask),
            features,
            Array3::zeros((3, 2, 2)),
        )
        .unwrap();

        let out = model
            .embed(&batch)
            .unwrap()
            .reshape((2, 3, 3))
            .unwrap()
            .to_vec3::<f32>()
            .unwrap();
        // the head of a frozen state repeats
        assert_eq!(out[0][0], out[0][1]);
        assert_eq!(out[0][1], out[0][2]);
        // a slot that never fired sees only the head bias
        assert_eq!(out[1][0], out[1][2]);
    }

    #[test]
    fn encode_records_only_non_empty_steps() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = tiny_config(ModelVariant::GcnLstm).with_geometry(1, 3, 2);
        let model = ConvTemporalModel::recurrent(&config, vb).unwrap();

        let mut mask = Array3::from_elem((1, 3, 2), true);
        mask.index_axis_mut(Axis(1), 1).fill(false);
        let batch = DynamicBatch::new(
            vec![Array3::zeros((3, 2, 3))],
            EgoMask::new(mask),
            Array3::from_elem((3, 2, 2), 0.5),
            Array3::zeros((3, 2, 2)),
        )
        .unwrap();

        let encoded = model.encode(&batch).unwrap();
        let steps: Vec<usize> = encoded.steps.iter().map(|s| s.timestep).collect();
        assert_eq!(steps, vec![0, 2]);
        assert!(encoded.placeholder.row(1).iter().all(|&v| v == 0.0));
        assert_eq!(encoded.placeholder.width(), 8);
    }

    #[test]
    fn encoding_runs_on_the_given_device() {
        let device = Device::Cpu;
        let batch = tiny_batch();
        let mut seen = Vec::new();
        let encoded = encode_timesteps(&batch, 2, &device, |x, _| {
            seen.push(x.device().same_device(&device));
            Ok(x.clone())
        })
        .unwrap();
        assert_eq!(seen.len(), encoded.steps.len());
        assert!(seen.iter().all(|&same| same));

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = DynamicGraphModel::new(&tiny_config(ModelVariant::GcnGru), vb).unwrap();
        assert!(model.device().same_device(&device));
    }
}
