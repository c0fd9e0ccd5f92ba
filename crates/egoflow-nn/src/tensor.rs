//! Host array <-> candle tensor conversion.
//!
//! Bookkeeping lives in `ndarray`; only the learned operators run on
//! [`Tensor`]s. These helpers copy at the boundary and never share storage.

use candle_core::{Device, Tensor};
use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3};

use crate::error::Result;

pub fn array2_to_tensor(array: ArrayView2<'_, f32>, device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(data, array.dim(), device)?)
}

pub fn array3_to_tensor(array: ArrayView3<'_, f32>, device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(data, array.dim(), device)?)
}

pub fn tensor_to_array2(tensor: &Tensor) -> Result<Array2<f32>> {
    let dims = tensor.dims2()?;
    let data = tensor.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array2::from_shape_vec(dims, data)?)
}

pub fn tensor_to_array3(tensor: &Tensor) -> Result<Array3<f32>> {
    let dims = tensor.dims3()?;
    let data = tensor.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array3::from_shape_vec(dims, data)?)
}

pub fn tensor_to_array4(tensor: &Tensor) -> Result<Array4<f32>> {
    let dims = tensor.dims4()?;
    let data = tensor.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array4::from_shape_vec(dims, data)?)
}
