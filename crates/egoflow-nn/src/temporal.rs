//! Temporal aggregation across the padded per-timestep embeddings.
//!
//! Every aggregator maps a `(B*N, T, H)` sequence to `(B*N, T, H)`. Padded
//! timesteps of a slot are zero vectors and are fed through unchanged; no
//! attention or recurrence mask is applied.

use candle_core::{Device, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM, RNN};
use candle_nn::{linear, ops, Linear, Module, VarBuilder};

use crate::error::{Error, Result};

/// Sinusoidal positional encoding, `(timesteps, dim)`.
///
/// Even columns hold `sin(p / 10000^(2i/dim))`, odd columns the matching
/// `cos`, for position `p` and pair index `i`.
pub fn positional_encoding(timesteps: usize, dim: usize, device: &Device) -> Result<Tensor> {
    let mut table = vec![0f32; timesteps * dim];
    for p in 0..timesteps {
        for c in 0..dim {
            let pair = (c / 2) as f64;
            let angle = p as f64 / 10000f64.powf(2.0 * pair / dim as f64);
            let v = if c % 2 == 0 { angle.sin() } else { angle.cos() };
            table[p * dim + c] = v as f32;
        }
    }
    Ok(Tensor::from_vec(table, (timesteps, dim), device)?)
}

/// Single-layer LSTM over the time axis. Parameters live under `lstm.*`.
#[derive(Debug, Clone)]
pub struct RecurrentAggregator {
    lstm: LSTM,
}

impl RecurrentAggregator {
    pub fn new(hidden: usize, vb: VarBuilder) -> Result<Self> {
        let lstm = lstm(hidden, hidden, LSTMConfig::default(), vb.pp("lstm"))?;
        Ok(Self { lstm })
    }

    pub fn forward(&self, seq: &Tensor) -> Result<Tensor> {
        let states = self.lstm.seq(seq)?;
        Ok(self.lstm.states_to_tensor(&states)?)
    }
}

/// Multi-head scaled dot-product self-attention across timesteps.
///
/// Positional encoding is added before projection. Parameters:
/// `query.*`, `key.*`, `value.*`, `out_proj.*`.
#[derive(Debug, Clone)]
pub struct AttentionAggregator {
    query: Linear,
    key: Linear,
    value: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl AttentionAggregator {
    /// `hidden` must be a multiple of `num_heads`.
    pub fn new(hidden: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        if num_heads == 0 || hidden % num_heads != 0 {
            return Err(Error::InvalidConfig(format!(
                "hidden width {hidden} is not divisible by {num_heads} heads"
            )));
        }
        Ok(Self {
            query: linear(hidden, hidden, vb.pp("query"))?,
            key: linear(hidden, hidden, vb.pp("key"))?,
            value: linear(hidden, hidden, vb.pp("value"))?,
            out_proj: linear(hidden, hidden, vb.pp("out_proj"))?,
            num_heads,
            head_dim: hidden / num_heads,
        })
    }

    fn split_heads(&self, x: &Tensor, slots: usize, timesteps: usize) -> Result<Tensor> {
        Ok(x
            .reshape((slots, timesteps, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    pub fn forward(&self, seq: &Tensor) -> Result<Tensor> {
        let (slots, timesteps, hidden) = seq.dims3()?;
        let pe = positional_encoding(timesteps, hidden, seq.device())?;
        let x = seq.broadcast_add(&pe.unsqueeze(0)?)?;

        let q = self.split_heads(&self.query.forward(&x)?, slots, timesteps)?;
        let k = self.split_heads(&self.key.forward(&x)?, slots, timesteps)?;
        let v = self.split_heads(&self.value.forward(&x)?, slots, timesteps)?;

        // (slots, heads, T, T)
        let scale = (self.head_dim as f64).sqrt().recip();
        let scores = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let weights = ops::softmax_last_dim(&scores)?;

        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((slots, timesteps, hidden))?;
        Ok(self.out_proj.forward(&context)?)
    }
}

/// Temporal strategy of the convolutional models. Parameters live under
/// `temporal.*` of the model.
#[derive(Debug, Clone)]
pub enum TemporalAggregator {
    Recurrent(RecurrentAggregator),
    Attention(AttentionAggregator),
}

impl TemporalAggregator {
    /// `(B*N, T, H) -> (B*N, T, H)`.
    pub fn forward(&self, seq: &Tensor) -> Result<Tensor> {
        match self {
            Self::Recurrent(agg) => agg.forward(seq),
            Self::Attention(agg) => agg.forward(seq),
        }
    }
}

/// `fc2(relu(fc1(x)))` applied to the last axis.
#[derive(Debug, Clone)]
pub struct FeedForwardHead {
    fc1: Linear,
    fc2: Linear,
}

impl FeedForwardHead {
    pub fn new(input: usize, hidden: usize, output: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            fc1: linear(input, hidden, vb.pp("fc1"))?,
            fc2: linear(hidden, output, vb.pp("fc2"))?,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.fc1.forward(x)?.relu()?;
        Ok(self.fc2.forward(&h)?)
    }
}
