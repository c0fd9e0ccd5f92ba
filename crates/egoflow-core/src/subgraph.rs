//! Per-timestep active subgraph extraction.
//!
//! Graph operators want a contiguous node list; the batch keeps every slot
//! at a fixed flat index. [`extract`] bridges the two: it selects the active
//! rows and columns for one timestep and remembers where each row came from,
//! so results can be scattered back into the padded layout afterwards.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::batch::DynamicBatch;
use crate::error::{ensure_dim, Error, Result};
use crate::mask::FlatMask;

/// Edge list in `(2, num_edges)` layout: sources then destinations.
///
/// Indices refer to rows of the active submatrix, not to flat slot indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeIndex {
    sources: Vec<usize>,
    targets: Vec<usize>,
}

impl EdgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel source / destination lists.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let (sources, targets) = pairs.into_iter().unzip();
        Self { sources, targets }
    }

    /// Enumerate the nonzero entries of a square matrix in row-major order.
    pub fn from_dense(adjacency: ArrayView2<'_, f32>) -> Result<Self> {
        ensure_dim("adjacency", "cols", adjacency.nrows(), adjacency.ncols())?;
        Ok(Self::from_pairs(
            adjacency
                .indexed_iter()
                .filter(|(_, w)| **w != 0.0)
                .map(|((row, col), _)| (row, col)),
        ))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sources.iter().copied().zip(self.targets.iter().copied())
    }

    /// `(2, E)` array: row 0 holds sources, row 1 destinations.
    pub fn to_array(&self) -> Array2<i64> {
        Array2::from_shape_fn((2, self.len()), |(r, e)| {
            if r == 0 {
                self.sources[e] as i64
            } else {
                self.targets[e] as i64
            }
        })
    }

    /// Fail with [`Error::InvalidGraph`] if any endpoint is `>= n_active`.
    pub fn validate(&self, n_active: usize) -> Result<()> {
        match self.iter().find(|&(s, d)| s >= n_active || d >= n_active) {
            Some((src, dst)) => Err(Error::InvalidGraph {
                src,
                dst,
                n_active,
            }),
            None => Ok(()),
        }
    }
}

/// The live part of one timestep, plus its position in the padded layout.
#[derive(Debug, Clone)]
pub struct ActiveSubgraph {
    pub timestep: usize,
    /// Flat slot index of each active row, ascending.
    pub indices: Vec<usize>,
    /// `(n_active, D)` features.
    pub features: Array2<f32>,
    /// `(n_active, n_active)` adjacency.
    pub adjacency: Array2<f32>,
    pub edges: EdgeIndex,
}

impl ActiveSubgraph {
    pub fn n_active(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Select the active rows / columns of one timestep.
///
/// `mask_row` has length `B*N`, `features` is `(B*N, D)` and `adjacency` is
/// `(B*N, B*N)`. An all-false row yields an empty subgraph.
pub fn extract(
    timestep: usize,
    mask_row: ArrayView1<'_, bool>,
    features: ArrayView2<'_, f32>,
    adjacency: ArrayView2<'_, f32>,
) -> Result<ActiveSubgraph> {
    let slots = mask_row.len();
    ensure_dim("features", "slots", slots, features.nrows())?;
    ensure_dim("adjacency", "rows", slots, adjacency.nrows())?;
    ensure_dim("adjacency", "cols", slots, adjacency.ncols())?;

    let indices: Vec<usize> = mask_row
        .iter()
        .enumerate()
        .filter_map(|(i, &on)| on.then_some(i))
        .collect();

    let features = features.select(Axis(0), &indices);
    let adjacency = adjacency
        .select(Axis(0), &indices)
        .select(Axis(1), &indices);
    let edges = EdgeIndex::from_dense(adjacency.view())?;
    edges.validate(indices.len())?;

    Ok(ActiveSubgraph {
        timestep,
        indices,
        features,
        adjacency,
        edges,
    })
}

/// [`extract`] for timestep `t` of a batch, using its precomputed flat mask.
pub fn extract_timestep(
    batch: &DynamicBatch,
    flat_mask: &FlatMask,
    timestep: usize,
) -> Result<ActiveSubgraph> {
    let timesteps = flat_mask.timesteps();
    if timestep >= timesteps {
        return Err(Error::TimestepOutOfRange {
            timestep,
            timesteps,
        });
    }
    extract(
        timestep,
        flat_mask.row(timestep),
        batch.features_at(timestep),
        batch.adjacency_at(timestep),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn extract_keeps_original_indices() {
        let mask = array![true, false, true, true];
        let features = array![[0.0f32, 0.5], [1.0, 1.5], [2.0, 2.5], [3.0, 3.5]];
        let mut adjacency = Array2::<f32>::zeros((4, 4));
        adjacency[[0, 2]] = 1.0;
        adjacency[[2, 0]] = 1.0;
        // edge into an inactive slot is ignored
        adjacency[[1, 3]] = 1.0;
        adjacency[[3, 3]] = 1.0;

        let sub = extract(5, mask.view(), features.view(), adjacency.view()).unwrap();
        assert_eq!(sub.timestep, 5);
        assert_eq!(sub.indices, vec![0, 2, 3]);
        assert_eq!(sub.features, array![[0.0f32, 0.5], [2.0, 2.5], [3.0, 3.5]]);
        assert_eq!(sub.adjacency.dim(), (3, 3));
        assert_eq!(sub.edges.sources(), &[0, 1, 2]);
        assert_eq!(sub.edges.targets(), &[1, 0, 2]);
        assert_eq!(sub.edges.to_array(), array![[0i64, 1, 2], [1, 0, 2]]);
    }

    #[test]
    fn empty_mask_row_yields_empty_subgraph() {
        let mask = Array1::from_elem(3, false);
        let sub = extract(
            0,
            mask.view(),
            Array2::<f32>::ones((3, 2)).view(),
            Array2::<f32>::ones((3, 3)).view(),
        )
        .unwrap();
        assert!(sub.is_empty());
        assert!(sub.edges.is_empty());
        assert_eq!(sub.features.dim(), (0, 2));
    }

    #[test]
    fn edges_always_within_active_range() {
        let mask = array![false, true, true, false, true];
        let adjacency = Array2::<f32>::ones((5, 5));
        let sub = extract(
            0,
            mask.view(),
            Array2::<f32>::zeros((5, 1)).view(),
            adjacency.view(),
        )
        .unwrap();
        assert_eq!(sub.edges.len(), 9);
        assert!(sub.edges.iter().all(|(s, d)| s < 3 && d < 3));
        assert!(sub.edges.validate(sub.n_active()).is_ok());
    }

    #[test]
    fn out_of_range_edge_is_invalid_graph() {
        let edges = EdgeIndex::from_pairs([(0, 1), (1, 4)]);
        let err = edges.validate(2).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidGraph {
                src: 1,
                dst: 4,
                n_active: 2
            }
        ));
    }

    #[test]
    fn slot_count_mismatch_rejected() {
        let mask = Array1::from_elem(3, true);
        let res = extract(
            0,
            mask.view(),
            Array2::<f32>::zeros((4, 2)).view(),
            Array2::<f32>::zeros((3, 3)).view(),
        );
        assert!(matches!(res, Err(Error::ShapeMismatch { .. })));
    }
}
