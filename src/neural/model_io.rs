//! Model I/O utilities using safetensors format
//!
//! Parameters are stored as F32 safetensors, keyed by VarStore variable name.
//! Loading is all-or-nothing: every variable must be present with the right
//! shape before any of them is overwritten.

use crate::{LayoutRlError, Result};
use safetensors::serialize_to_file;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use std::collections::HashMap;
use std::path::Path;
use tch::{nn, Kind, Tensor};

/// Save a VarStore to a safetensors file, with optional string metadata
pub fn save_varstore(
    vs: &nn::VarStore,
    path: impl AsRef<Path>,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();

    for (name, tensor) in vs.variables() {
        let shape: Vec<usize> = tensor.size().iter().map(|&x| x as usize).collect();
        let flat = tensor
            .to_device(tch::Device::Cpu)
            .to_kind(Kind::Float)
            .flatten(0, -1)
            .contiguous();
        let data: Vec<f32> = Vec::<f32>::try_from(&flat)?;
        let bytes: Vec<u8> = data.iter().flat_map(|x| x.to_le_bytes()).collect();
        buffers.push((name, shape, bytes));
    }

    let views = buffers
        .iter()
        .map(|(name, shape, bytes)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (name.clone(), view))
                .map_err(|e| LayoutRlError::ModelIo(format!("tensor {name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    serialize_to_file(views, &metadata, path.as_ref())
        .map_err(|e| LayoutRlError::ModelIo(e.to_string()))?;

    Ok(())
}

/// Load a VarStore from a safetensors file
pub fn load_varstore(vs: &mut nn::VarStore, path: impl AsRef<Path>) -> Result<()> {
    let buffer = std::fs::read(path.as_ref())?;
    let tensors =
        SafeTensors::deserialize(&buffer).map_err(|e| LayoutRlError::ModelIo(e.to_string()))?;

    let variables = vs.variables();
    let mut loaded: Vec<(Tensor, Tensor)> = Vec::with_capacity(variables.len());

    for (name, var) in variables {
        let view = tensors
            .tensor(&name)
            .map_err(|_| LayoutRlError::ModelIo(format!("tensor '{name}' not found")))?;
        let tensor = tensor_view_to_tensor(&view)?;
        if tensor.size() != var.size() {
            return Err(LayoutRlError::ModelIo(format!(
                "tensor '{}' has shape {:?}, expected {:?}",
                name,
                tensor.size(),
                var.size()
            )));
        }
        loaded.push((var, tensor));
    }

    tch::no_grad(|| {
        for (mut var, tensor) in loaded {
            var.copy_(&tensor);
        }
    });

    Ok(())
}

/// Read the metadata block of a safetensors file
pub fn read_metadata(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let buffer = std::fs::read(path.as_ref())?;
    let (_, metadata) =
        SafeTensors::read_metadata(&buffer).map_err(|e| LayoutRlError::ModelIo(e.to_string()))?;
    Ok(metadata.metadata().clone().unwrap_or_default())
}

fn tensor_view_to_tensor(view: &TensorView) -> Result<Tensor> {
    let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
    let data = view.data();

    match view.dtype() {
        Dtype::F32 => {
            let floats: Vec<f32> = data
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            Ok(Tensor::from_slice(&floats).reshape(&shape))
        }
        Dtype::F64 => {
            let doubles: Vec<f64> = data
                .chunks_exact(8)
                .map(|chunk| {
                    f64::from_le_bytes([
                        chunk[0], chunk[1], chunk[2], chunk[3],
                        chunk[4], chunk[5], chunk[6], chunk[7],
                    ])
                })
                .collect();
            Ok(Tensor::from_slice(&doubles).reshape(&shape).to_kind(Kind::Float))
        }
        other => Err(LayoutRlError::ModelIo(format!("unsupported dtype: {other:?}"))),
    }
}
