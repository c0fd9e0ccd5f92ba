//! Fixed-size padded embedding arena.
//!
//! The placeholder keeps the full `(T, B*N, width)` layout for the whole
//! run. Active-subgraph results are written back at their original flat
//! indices; every other position at that timestep stays zero.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::error::{ensure_dim, Error, Result};
use crate::subgraph::ActiveSubgraph;

/// Zero-initialized `(T, B*N, width)` arena with one write per timestep.
#[derive(Debug, Clone)]
pub struct EmbeddingPlaceholder {
    data: Array3<f32>,
    written: Vec<Option<Vec<usize>>>,
}

impl EmbeddingPlaceholder {
    pub fn zeros(timesteps: usize, slots: usize, width: usize) -> Self {
        Self {
            data: Array3::zeros((timesteps, slots, width)),
            written: vec![None; timesteps],
        }
    }

    pub fn timesteps(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn slots(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Scatter `rows[r]` into `placeholder[timestep, indices[r]]`.
    ///
    /// A timestep accepts exactly one write.
    pub fn write(&mut self, timestep: usize, indices: &[usize], rows: ArrayView2<'_, f32>) -> Result<()> {
        let timesteps = self.timesteps();
        if timestep >= timesteps {
            return Err(Error::TimestepOutOfRange {
                timestep,
                timesteps,
            });
        }
        if self.written[timestep].is_some() {
            return Err(Error::TimestepAlreadyWritten(timestep));
        }
        ensure_dim("embedding", "rows", indices.len(), rows.nrows())?;
        ensure_dim("embedding", "width", self.width(), rows.ncols())?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.slots()) {
            return Err(Error::shape("embedding", "slot", self.slots(), bad + 1));
        }

        for (row, &slot) in rows.outer_iter().zip(indices) {
            self.data.slice_mut(s![timestep, slot, ..]).assign(&row);
        }
        self.written[timestep] = Some(indices.to_vec());
        Ok(())
    }

    /// Write the result computed for `subgraph`.
    pub fn write_subgraph(&mut self, subgraph: &ActiveSubgraph, rows: ArrayView2<'_, f32>) -> Result<()> {
        self.write(subgraph.timestep, &subgraph.indices, rows)
    }

    /// Flat indices written at `timestep`; `None` if the timestep was skipped.
    pub fn written_indices(&self, timestep: usize) -> Option<&[usize]> {
        self.written.get(timestep).and_then(|w| w.as_deref())
    }

    /// `(B*N, width)` slice at `timestep`.
    pub fn row(&self, timestep: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), timestep)
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// Gather the rows at `indices` for `timestep`.
    pub fn gather(&self, timestep: usize, indices: &[usize]) -> Array2<f32> {
        self.row(timestep).select(Axis(0), indices)
    }
}
