//! Graph convolution over the active subgraph of one timestep.
//!
//! [`GCNConv`] follows the symmetric-normalized propagation rule of Kipf &
//! Welling:
//!
//! ```text
//! H' = D^{-1/2} (A + I) D^{-1/2} (H W) + b
//! ```
//!
//! where `A[dst, src] = 1` for every edge of the [`EdgeIndex`] and `D` counts
//! incoming edges including the self-loop. The layer sees only the compacted
//! `(n_active, in)` features of one timestep; padding never reaches it.

use candle_core::{Device, Tensor};
use candle_nn::{linear_no_bias, Init, Linear, Module, VarBuilder};
use egoflow_core::EdgeIndex;

use crate::error::Result;

/// Graph Convolutional Network layer.
///
/// Parameters: `lin.weight` `(out, in)` and `bias` `(out,)`.
///
/// # Reference
///
/// Kipf & Welling, "Semi-Supervised Classification with Graph Convolutional
/// Networks", ICLR 2017.
#[derive(Debug, Clone)]
pub struct GCNConv {
    linear: Linear,
    bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl GCNConv {
    /// Create a new GCN layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension
    /// - `vb`: Variable builder for parameter initialization
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let linear = linear_no_bias(in_features, out_features, vb.pp("lin"))?;
        let bias = vb.get_with_hints(out_features, "bias", Init::Const(0.0))?;
        Ok(Self {
            linear,
            bias,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Dense `(n, n)` normalized propagation matrix for `edges`.
    ///
    /// Every node gets exactly one self-loop; self-loop edges already present
    /// in `edges` are not counted twice. Fails with an invalid-graph error if
    /// an endpoint is `>= n`.
    pub fn normalized_adjacency(edges: &EdgeIndex, n: usize, device: &Device) -> Result<Tensor> {
        edges.validate(n)?;

        let mut a = vec![0f32; n * n];
        for (src, dst) in edges.iter() {
            if src != dst {
                a[dst * n + src] += 1.0;
            }
        }
        for i in 0..n {
            a[i * n + i] = 1.0;
        }

        let inv_sqrt_deg: Vec<f32> = (0..n)
            .map(|i| {
                let deg: f32 = a[i * n..(i + 1) * n].iter().sum();
                deg.sqrt().recip()
            })
            .collect();
        for dst in 0..n {
            for src in 0..n {
                a[dst * n + src] *= inv_sqrt_deg[dst] * inv_sqrt_deg[src];
            }
        }

        Ok(Tensor::from_vec(a, (n, n), device)?)
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// - `x`: Node features `(n_active, in_features)`
    /// - `edges`: Edge list over `0..n_active`
    ///
    /// # Returns
    /// - Node embeddings `(n_active, out_features)`
    pub fn forward(&self, x: &Tensor, edges: &EdgeIndex) -> Result<Tensor> {
        let n = x.dim(0)?;
        let adj = Self::normalized_adjacency(edges, n, x.device())?;
        let h = self.linear.forward(x)?;
        Ok(adj.matmul(&h)?.broadcast_add(&self.bias)?)
    }
}

/// Two GCN layers with a ReLU in between: `in -> hidden -> hidden`.
///
/// Used as the per-timestep spatial encoder by the convolutional variants.
#[derive(Debug, Clone)]
pub struct GcnStack {
    gcn1: GCNConv,
    gcn2: GCNConv,
}

impl GcnStack {
    /// Parameters live under `gcn1.*` and `gcn2.*` of `vb`.
    pub fn new(in_features: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            gcn1: GCNConv::new(in_features, hidden, vb.pp("gcn1"))?,
            gcn2: GCNConv::new(hidden, hidden, vb.pp("gcn2"))?,
        })
    }

    pub fn out_features(&self) -> usize {
        self.gcn2.out_features()
    }

    pub fn forward(&self, x: &Tensor, edges: &EdgeIndex) -> Result<Tensor> {
        let h = self.gcn1.forward(x, edges)?.relu()?;
        self.gcn2.forward(&h, edges)
    }
}
