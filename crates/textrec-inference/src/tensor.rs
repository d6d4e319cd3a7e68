//! Tensors exchanged with inference backends.

use std::fmt;

use ndarray::{Array, ArrayD, Dimension, IxDyn};

use crate::error::InferenceError;
use crate::Result;

/// Element types a backend may accept or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    Float32,
    Int64,
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorType::Float32 => f.write_str("float32"),
            TensorType::Int64 => f.write_str("int64"),
        }
    }
}

/// A dense, row-major tensor of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Float32(ArrayD<f32>),
    Int64(ArrayD<i64>),
}

/// Tensor handed to a backend.
pub type InputTensor = Tensor;

/// Tensor returned by a backend.
pub type OutputTensor = Tensor;

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Float32(arr) => arr.shape(),
            Tensor::Int64(arr) => arr.shape(),
        }
    }

    pub fn dtype(&self) -> TensorType {
        match self {
            Tensor::Float32(_) => TensorType::Float32,
            Tensor::Int64(_) => TensorType::Int64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Tensor::Float32(arr) => arr.len(),
            Tensor::Int64(arr) => arr.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a float32 tensor from row-major data.
    ///
    /// Fails with [`InferenceError::ShapeMismatch`] when `data` does not fill `shape`.
    pub fn from_f32(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let len = data.len();
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(Tensor::Float32)
            .map_err(|e| {
                InferenceError::ShapeMismatch(format!("{} values for shape {:?}: {}", len, shape, e))
            })
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Tensor::Float32(arr) => Some(arr),
            Tensor::Int64(_) => None,
        }
    }

    /// Consume the tensor, returning the float32 array if that is its type.
    pub fn into_f32(self) -> Option<ArrayD<f32>> {
        match self {
            Tensor::Float32(arr) => Some(arr),
            Tensor::Int64(_) => None,
        }
    }
}

impl<D: Dimension> From<Array<f32, D>> for Tensor {
    fn from(arr: Array<f32, D>) -> Self {
        Tensor::Float32(arr.into_dyn())
    }
}

impl<D: Dimension> From<Array<i64, D>> for Tensor {
    fn from(arr: Array<i64, D>) -> Self {
        Tensor::Int64(arr.into_dyn())
    }
}
