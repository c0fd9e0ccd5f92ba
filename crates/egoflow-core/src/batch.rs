//! Batched dynamic graph input.
//!
//! A [`DynamicBatch`] bundles `B` episodes that share the padded node
//! capacity `N` and the horizon `T`:
//!
//! | Field | Shape | Meaning |
//! |-------|-------|---------|
//! | `positions` | `B x (T, N, C)` | raw per-instance channels (coords, group id) |
//! | `ego_mask` | `(B, T, N)` | slot activity |
//! | `features` | `(T, B*N, D)` | flattened model input |
//! | `adjacency` | `(T, B*N, B*N)` | block-diagonal adjacency |
//!
//! Construction validates that all four agree on `B`, `T` and `N`; nothing is
//! broadcast.

use std::collections::BTreeSet;

use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};

use crate::error::{ensure_dim, Error, Result};
use crate::mask::{flat_index, EgoMask, FlatMask};

/// One graph instance over time, before batching.
#[derive(Debug, Clone)]
pub struct GraphEpisode {
    /// `(T, N, C)` raw channels per slot.
    pub positions: Array3<f32>,
    /// `(T, N, N)` adjacency per timestep.
    pub adjacency: Array3<f32>,
    /// `(T, N)` slot activity.
    pub ego_mask: Array2<bool>,
}

impl GraphEpisode {
    pub fn timesteps(&self) -> usize {
        self.positions.len_of(Axis(0))
    }

    pub fn nodes(&self) -> usize {
        self.positions.len_of(Axis(1))
    }

    fn validate(&self) -> Result<()> {
        let (t, n, _) = self.positions.dim();
        ensure_dim("episode.adjacency", "timesteps", t, self.adjacency.len_of(Axis(0)))?;
        ensure_dim("episode.adjacency", "rows", n, self.adjacency.len_of(Axis(1)))?;
        ensure_dim("episode.adjacency", "cols", n, self.adjacency.len_of(Axis(2)))?;
        ensure_dim("episode.ego_mask", "timesteps", t, self.ego_mask.nrows())?;
        ensure_dim("episode.ego_mask", "nodes", n, self.ego_mask.ncols())
    }
}

/// Batch dimensions shared by every tensor of a [`DynamicBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDims {
    pub batch: usize,
    pub timesteps: usize,
    pub nodes: usize,
    pub input_dim: usize,
}

impl BatchDims {
    /// `B * N`.
    pub fn slots(&self) -> usize {
        self.batch * self.nodes
    }
}

/// A validated batch ready for the forward pass.
#[derive(Debug, Clone)]
pub struct DynamicBatch {
    positions: Vec<Array3<f32>>,
    ego_mask: EgoMask,
    features: Array3<f32>,
    adjacency: Array3<f32>,
}

impl DynamicBatch {
    /// Assemble a batch from already-flattened tensors.
    pub fn new(
        positions: Vec<Array3<f32>>,
        ego_mask: EgoMask,
        features: Array3<f32>,
        adjacency: Array3<f32>,
    ) -> Result<Self> {
        let b = ego_mask.batch_size();
        let t = ego_mask.timesteps();
        let n = ego_mask.nodes();

        ensure_dim("positions", "batch", b, positions.len())?;
        for p in &positions {
            ensure_dim("positions", "timesteps", t, p.len_of(Axis(0)))?;
            ensure_dim("positions", "nodes", n, p.len_of(Axis(1)))?;
        }
        ensure_dim("big_batch_positions", "timesteps", t, features.len_of(Axis(0)))?;
        ensure_dim("big_batch_positions", "slots", b * n, features.len_of(Axis(1)))?;
        ensure_dim("big_batched_adjacency", "timesteps", t, adjacency.len_of(Axis(0)))?;
        ensure_dim("big_batched_adjacency", "rows", b * n, adjacency.len_of(Axis(1)))?;
        ensure_dim("big_batched_adjacency", "cols", b * n, adjacency.len_of(Axis(2)))?;

        Ok(Self {
            positions,
            ego_mask,
            features,
            adjacency,
        })
    }

    /// Collate episodes into one batch.
    ///
    /// Features are the first `input_dim` channels of each episode's
    /// positions; the adjacency is block-diagonal so instances never share
    /// edges.
    pub fn collate(episodes: &[GraphEpisode], input_dim: usize) -> Result<Self> {
        let first = episodes
            .first()
            .ok_or_else(|| Error::shape("episodes", "batch", 1, 0))?;
        let (t, n) = (first.timesteps(), first.nodes());
        let b = episodes.len();

        for ep in episodes {
            ep.validate()?;
            ensure_dim("episode.positions", "timesteps", t, ep.timesteps())?;
            ensure_dim("episode.positions", "nodes", n, ep.nodes())?;
            let channels = ep.positions.len_of(Axis(2));
            if channels < input_dim {
                return Err(Error::shape("episode.positions", "channels", input_dim, channels));
            }
        }

        let masks: Vec<Array2<bool>> = episodes.iter().map(|e| e.ego_mask.clone()).collect();
        let ego_mask = EgoMask::from_instances(&masks)?;

        let mut features = Array3::<f32>::zeros((t, b * n, input_dim));
        let mut adjacency = Array3::<f32>::zeros((t, b * n, b * n));
        for (bi, ep) in episodes.iter().enumerate() {
            let lo = flat_index(bi, 0, n);
            let hi = lo + n;
            features
                .slice_mut(s![.., lo..hi, ..])
                .assign(&ep.positions.slice(s![.., .., ..input_dim]));
            adjacency
                .slice_mut(s![.., lo..hi, lo..hi])
                .assign(&ep.adjacency);
        }

        tracing::debug!(batch = b, timesteps = t, nodes = n, input_dim, "collated episodes");
        let positions = episodes.iter().map(|e| e.positions.clone()).collect();
        Self::new(positions, ego_mask, features, adjacency)
    }

    pub fn dims(&self) -> BatchDims {
        BatchDims {
            batch: self.ego_mask.batch_size(),
            timesteps: self.ego_mask.timesteps(),
            nodes: self.ego_mask.nodes(),
            input_dim: self.features.len_of(Axis(2)),
        }
    }

    pub fn positions(&self) -> &[Array3<f32>] {
        &self.positions
    }

    pub fn ego_mask(&self) -> &EgoMask {
        &self.ego_mask
    }

    /// `(T, B*N)` mask.
    pub fn flat_mask(&self) -> FlatMask {
        self.ego_mask.flatten()
    }

    /// `(T, B*N, D)` features.
    pub fn features(&self) -> &Array3<f32> {
        &self.features
    }

    /// `(T, B*N, B*N)` adjacency.
    pub fn adjacency(&self) -> &Array3<f32> {
        &self.adjacency
    }

    pub fn features_at(&self, timestep: usize) -> ArrayView2<'_, f32> {
        self.features.index_axis(Axis(0), timestep)
    }

    pub fn adjacency_at(&self, timestep: usize) -> ArrayView2<'_, f32> {
        self.adjacency.index_axis(Axis(0), timestep)
    }

    /// Raw group ids of instance `batch`, read from `channel` at timestep 0.
    pub fn group_ids(&self, batch: usize, channel: usize) -> Result<Array1<i64>> {
        let positions = self
            .positions
            .get(batch)
            .ok_or_else(|| Error::shape("positions", "batch", batch + 1, self.positions.len()))?;
        let channels = positions.len_of(Axis(2));
        if channel >= channels {
            return Err(Error::shape("positions", "channels", channel + 1, channels));
        }
        Ok(positions
            .slice(s![0, .., channel])
            .mapv(|v| v.round() as i64))
    }
}

/// Map arbitrary integer labels onto `0..L` in ascending label order.
///
/// Returns the dense labels and the number of distinct labels `L`.
pub fn densify_labels(raw: &[i64]) -> (Vec<usize>, usize) {
    let distinct: Vec<i64> = raw.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let dense = raw
        .iter()
        .map(|v| distinct.binary_search(v).unwrap_or_default())
        .collect();
    (dense, distinct.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(t: usize, n: usize, fill: f32) -> GraphEpisode {
        let mut adjacency = Array3::zeros((t, n, n));
        for ti in 0..t {
            for i in 0..n.saturating_sub(1) {
                adjacency[[ti, i, i + 1]] = 1.0;
                adjacency[[ti, i + 1, i]] = 1.0;
            }
        }
        GraphEpisode {
            positions: Array3::from_shape_fn((t, n, 3), |(_, i, c)| {
                if c == 2 {
                    (i % 2) as f32
                } else {
                    fill + i as f32
                }
            }),
            adjacency,
            ego_mask: Array2::from_elem((t, n), true),
        }
    }

    #[test]
    fn collate_builds_block_diagonal() {
        let batch = DynamicBatch::collate(&[episode(2, 3, 0.0), episode(2, 3, 10.0)], 2).unwrap();
        let dims = batch.dims();
        assert_eq!(dims.batch, 2);
        assert_eq!(dims.slots(), 6);
        assert_eq!(dims.input_dim, 2);

        let adj = batch.adjacency_at(1);
        // inside instance 1
        assert_eq!(adj[[3, 4]], 1.0);
        // never across instances
        for i in 0..3 {
            for j in 3..6 {
                assert_eq!(adj[[i, j]], 0.0);
                assert_eq!(adj[[j, i]], 0.0);
            }
        }
        // slot 1 of instance 1 lives at flat index 4
        assert_eq!(batch.features_at(0)[[4, 0]], 11.0);
    }

    #[test]
    fn new_rejects_mismatched_slots() {
        let mask = EgoMask::new(Array3::from_elem((1, 2, 3), true));
        let positions = vec![Array3::zeros((2, 3, 3))];
        let err = DynamicBatch::new(
            positions,
            mask,
            Array3::zeros((2, 4, 2)),
            Array3::zeros((2, 3, 3)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                tensor: "big_batch_positions",
                dim: "slots",
                expected: 3,
                got: 4
            }
        ));
    }

    #[test]
    fn new_rejects_mismatched_timesteps() {
        let mask = EgoMask::new(Array3::from_elem((1, 2, 3), true));
        let err = DynamicBatch::new(
            vec![Array3::zeros((2, 3, 3))],
            mask,
            Array3::zeros((2, 3, 2)),
            Array3::zeros((3, 3, 3)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("big_batched_adjacency"));
    }

    #[test]
    fn collate_rejects_short_channels() {
        assert!(DynamicBatch::collate(&[episode(2, 3, 0.0)], 4).is_err());
        assert!(DynamicBatch::collate(&[], 2).is_err());
    }

    #[test]
    fn group_ids_and_densify() {
        let batch = DynamicBatch::collate(&[episode(2, 4, 0.0)], 2).unwrap();
        let ids = batch.group_ids(0, 2).unwrap();
        assert_eq!(ids.to_vec(), vec![0, 1, 0, 1]);
        assert!(batch.group_ids(0, 3).is_err());
        assert!(batch.group_ids(1, 2).is_err());

        let (dense, count) = densify_labels(&[7, -1, 7, 3]);
        assert_eq!(dense, vec![2, 0, 2, 1]);
        assert_eq!(count, 3);
    }
}
