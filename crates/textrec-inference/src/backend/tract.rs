//! Tract backend for pure-Rust ONNX inference.
//!
//! Tract plans are compiled for one concrete input shape, so this backend
//! pairs with the fixed-width preprocessing mode.

use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use tract_onnx::prelude::*;
use tracing::debug;

use crate::error::InferenceError;
use crate::tensor::Tensor as TextrecTensor;
use crate::{InferenceBackend, Result};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Backend using Tract with a static input shape.
pub struct TractBackend {
    plan: Plan,
    input_shape: Vec<usize>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl TractBackend {
    /// Load a recognition model compiled for `(1, 3, height, width)` inputs.
    pub fn for_recognition<P: AsRef<Path>>(path: P, height: usize, width: usize) -> Result<Self> {
        Self::from_file_with_shape(path, &[1, 3, height, width])
    }

    /// Load a model from a file path, compiled for `input_shape`.
    pub fn from_file_with_shape<P: AsRef<Path>>(path: P, input_shape: &[usize]) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading ONNX model with Tract from: {}", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| InferenceError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        Self::compile(model, input_shape)
    }

    /// Load a model from bytes, compiled for `input_shape`.
    pub fn from_bytes_with_shape(bytes: &[u8], input_shape: &[usize]) -> Result<Self> {
        debug!("Loading ONNX model with Tract from {} bytes", bytes.len());

        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        Self::compile(model, input_shape)
    }

    fn compile(mut model: InferenceModel, input_shape: &[usize]) -> Result<Self> {
        let input_names = model
            .input_outlets()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect();
        let output_names = model
            .output_outlets()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect();

        // Pin the dynamic batch and width axes
        model
            .set_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))
            .map_err(|e| InferenceError::Session(format!("input shape {:?}: {}", input_shape, e)))?;

        let plan = model
            .into_optimized()
            .and_then(|typed| typed.into_runnable())
            .map_err(|e| InferenceError::Session(e.to_string()))?;

        debug!("Compiled Tract plan for input shape {:?}", input_shape);

        Ok(Self {
            plan,
            input_shape: input_shape.to_vec(),
            input_names,
            output_names,
        })
    }

    /// The input shape the plan was compiled for.
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }
}

impl InferenceBackend for TractBackend {
    fn run(&self, inputs: &[(&str, TextrecTensor)]) -> Result<Vec<(String, TextrecTensor)>> {
        let values = inputs
            .iter()
            .map(|(_, tensor)| {
                if tensor.shape() != self.input_shape.as_slice() {
                    return Err(InferenceError::ShapeMismatch(format!(
                        "plan compiled for {:?}, got {:?}",
                        self.input_shape,
                        tensor.shape()
                    )));
                }
                match tensor {
                    TextrecTensor::Float32(arr) => to_tvalue(arr),
                    TextrecTensor::Int64(arr) => to_tvalue(arr),
                }
            })
            .collect::<Result<TVec<TValue>>>()?;

        let outputs = self
            .plan
            .run(values)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        outputs
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let name = self
                    .output_names
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("output_{}", idx));

                let tensor = if let Some(arr) = from_tvalue::<f32>(value) {
                    TextrecTensor::Float32(arr?)
                } else if let Some(arr) = from_tvalue::<i64>(value) {
                    TextrecTensor::Int64(arr?)
                } else {
                    return Err(InferenceError::UnsupportedType(name));
                };

                Ok((name, tensor))
            })
            .collect()
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

// Tract bundles its own ndarray, so values are copied across element-wise.
fn to_tvalue<T: Datum + Copy>(arr: &ArrayD<T>) -> Result<TValue> {
    let data: Vec<T> = arr.iter().copied().collect();
    tract_ndarray::ArrayD::from_shape_vec(tract_ndarray::IxDyn(arr.shape()), data)
        .map(|a| a.into_tvalue())
        .map_err(|e| InferenceError::InvalidInput(e.to_string()))
}

fn from_tvalue<T: Datum + Copy>(value: &TValue) -> Option<Result<ArrayD<T>>> {
    let view = value.to_array_view::<T>().ok()?;
    let data: Vec<T> = view.iter().copied().collect();
    Some(
        ArrayD::from_shape_vec(IxDyn(view.shape()), data)
            .map_err(|e| InferenceError::OutputExtraction(e.to_string())),
    )
}
