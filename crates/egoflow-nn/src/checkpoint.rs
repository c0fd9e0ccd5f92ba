//! Named parameter storage.
//!
//! Models never own their parameters' provenance: they are built from a
//! [`VarBuilder`] handed out by a [`ParameterStore`], which either creates
//! freshly initialized variables or serves tensors read from a safetensors
//! checkpoint. A checkpoint whose names or shapes do not match the model
//! fails at construction time.
//!
//! ```rust,ignore
//! let store = ParameterStore::load("model.safetensors", &Device::Cpu)?;
//! let model = DynamicGraphModel::new(&config, store.var_builder(&Device::Cpu))?;
//! ```

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use tracing::info;

use crate::error::Result;

/// Source of a model's named parameters.
#[derive(Clone)]
pub enum ParameterStore {
    /// Variables created on first request, with each layer's default init.
    Fresh(VarMap),
    /// Tensors read from a checkpoint.
    Loaded(HashMap<String, Tensor>),
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::fresh()
    }
}

impl ParameterStore {
    pub fn fresh() -> Self {
        Self::Fresh(VarMap::new())
    }

    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        let tensors = candle_core::safetensors::load(path, device)?;
        info!(path = %path.display(), tensors = tensors.len(), "loaded checkpoint");
        Ok(Self::Loaded(tensors))
    }

    pub fn var_builder(&self, device: &Device) -> VarBuilder<'static> {
        match self {
            Self::Fresh(varmap) => VarBuilder::from_varmap(varmap, DType::F32, device),
            Self::Loaded(tensors) => VarBuilder::from_tensors(tensors.clone(), DType::F32, device),
        }
    }

    /// Write every parameter under its dotted name.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match self {
            Self::Fresh(varmap) => varmap.save(path)?,
            Self::Loaded(tensors) => candle_core::safetensors::save(tensors, path)?,
        }
        info!(path = %path.display(), "saved checkpoint");
        Ok(())
    }

    /// Parameter names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self {
            Self::Fresh(varmap) => match varmap.data().lock() {
                Ok(data) => data.keys().cloned().collect(),
                Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
            },
            Self::Loaded(tensors) => tensors.keys().cloned().collect(),
        };
        names.sort();
        names
    }

    /// Look up one parameter by name.
    pub fn get(&self, name: &str) -> Option<Tensor> {
        match self {
            Self::Fresh(varmap) => match varmap.data().lock() {
                Ok(data) => data.get(name).map(|v| v.as_tensor().clone()),
                Err(poisoned) => poisoned.into_inner().get(name).map(|v| v.as_tensor().clone()),
            },
            Self::Loaded(tensors) => tensors.get(name).cloned(),
        }
    }
}
