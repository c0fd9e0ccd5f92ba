//! Ego-mask construction.
//!
//! The ego-mask flags which node slots hold a live node at each timestep.
//! Batched tensors address slot `n` of instance `b` at flat index
//! `b * N + n`; [`EgoMask::flatten`] produces the `(T, B*N)` view in exactly
//! that order so it lines up with the flattened features and adjacency.

use ndarray::{Array2, Array3, ArrayView1, Axis};

use crate::error::{ensure_dim, Result};

/// Flat index of slot `node` of instance `batch` with `nodes` slots per instance.
#[inline]
pub fn flat_index(batch: usize, node: usize, nodes: usize) -> usize {
    batch * nodes + node
}

/// Activity indicator over `(batch, timestep, node_slot)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgoMask {
    inner: Array3<bool>,
}

impl EgoMask {
    /// Wrap a `(B, T, N)` activity array.
    pub fn new(inner: Array3<bool>) -> Self {
        Self { inner }
    }

    /// Stack per-instance `(T, N)` activity matrices into `(B, T, N)`.
    ///
    /// Every instance must share the first instance's `(T, N)`.
    pub fn from_instances(instances: &[Array2<bool>]) -> Result<Self> {
        let (t, n) = instances.first().map_or((0, 0), |m| m.dim());
        for m in instances {
            ensure_dim("ego_mask", "timesteps", t, m.nrows())?;
            ensure_dim("ego_mask", "nodes", n, m.ncols())?;
        }
        let inner = Array3::from_shape_fn((instances.len(), t, n), |(b, ti, ni)| {
            instances[b][[ti, ni]]
        });
        Ok(Self { inner })
    }

    pub fn batch_size(&self) -> usize {
        self.inner.len_of(Axis(0))
    }

    pub fn timesteps(&self) -> usize {
        self.inner.len_of(Axis(1))
    }

    pub fn nodes(&self) -> usize {
        self.inner.len_of(Axis(2))
    }

    /// `true` if slot `node` of instance `batch` is live at `timestep`.
    pub fn is_active(&self, batch: usize, timestep: usize, node: usize) -> bool {
        self.inner[[batch, timestep, node]]
    }

    pub fn as_array(&self) -> &Array3<bool> {
        &self.inner
    }

    /// Rearrange `(B, T, N)` into `(T, B*N)`, batch-major within each row.
    pub fn flatten(&self) -> FlatMask {
        let (_, t, n) = self.inner.dim();
        let b = self.batch_size();
        let rows = Array2::from_shape_fn((t, b * n), |(ti, flat)| {
            self.inner[[flat / n, ti, flat % n]]
        });
        FlatMask { rows, nodes: n }
    }
}

/// The `(T, B*N)` form of an [`EgoMask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMask {
    rows: Array2<bool>,
    nodes: usize,
}

impl FlatMask {
    pub fn timesteps(&self) -> usize {
        self.rows.nrows()
    }

    /// Row width, `B * N`.
    pub fn width(&self) -> usize {
        self.rows.ncols()
    }

    /// Slots per instance, `N`.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn row(&self, timestep: usize) -> ArrayView1<'_, bool> {
        self.rows.row(timestep)
    }

    /// Flat indices that are active at `timestep`, ascending.
    pub fn active_indices(&self, timestep: usize) -> Vec<usize> {
        self.rows
            .row(timestep)
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect()
    }

    pub fn active_count(&self, timestep: usize) -> usize {
        self.rows.row(timestep).iter().filter(|&&on| on).count()
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.rows
    }
}
