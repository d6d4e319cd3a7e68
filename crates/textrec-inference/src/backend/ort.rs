//! ONNX Runtime (ort) backend for native platforms with XNNPACK.

use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;

use ndarray::{ArrayD, IxDyn};
use ort::ep::XNNPACK;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor as OrtTensor;
use tracing::debug;

use crate::error::InferenceError;
use crate::tensor::Tensor;
use crate::{InferenceBackend, Result};

/// Session settings for [`OrtBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrtOptions {
    /// Intra-op CPU threads (at least 1).
    pub intra_threads: usize,
    /// Register the XNNPACK execution provider.
    pub xnnpack: bool,
}

impl Default for OrtOptions {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            xnnpack: true,
        }
    }
}

/// Backend using ONNX Runtime for native inference.
///
/// Recognition models take a dynamic width axis, so one session serves
/// every crop size. Calls are serialized on the session.
pub struct OrtBackend {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OrtBackend {
    /// Load a model from a file path with default options.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_options(path, &OrtOptions::default())
    }

    /// Load a model from a file path using `threads` intra-op threads.
    pub fn from_file_with_threads<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let options = OrtOptions {
            intra_threads: threads,
            ..OrtOptions::default()
        };
        Self::from_file_with_options(path, &options)
    }

    pub fn from_file_with_options<P: AsRef<Path>>(path: P, options: &OrtOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading ONNX model from: {}", path.display());

        let bytes = std::fs::read(path)?;
        Self::from_bytes_with_options(&bytes, options)
    }

    /// Load a model from bytes with default options.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_options(bytes, &OrtOptions::default())
    }

    pub fn from_bytes_with_options(bytes: &[u8], options: &OrtOptions) -> Result<Self> {
        debug!("Creating ONNX session from {} bytes ({:?})", bytes.len(), options);

        let mut builder = Session::builder().map_err(session_error)?;
        if options.xnnpack {
            builder = builder
                .with_execution_providers([XNNPACK::default().build()])
                .map_err(session_error)?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(session_error)?
            .with_intra_threads(options.intra_threads.max(1))
            .map_err(session_error)?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        let input_names: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        debug!("Model inputs: {:?}, outputs: {:?}", input_names, output_names);

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_names,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn run(&self, inputs: &[(&str, Tensor)]) -> Result<Vec<(String, Tensor)>> {
        let ort_inputs = inputs
            .iter()
            .map(|(name, tensor)| Ok((*name, to_session_input(tensor)?)))
            .collect::<Result<Vec<(&str, SessionInputValue<'static>)>>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::SessionPoisoned)?;

        let outputs = session
            .run(ort_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                Tensor::Float32(to_array(shape, data)?)
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                Tensor::Int64(to_array(shape, data)?)
            } else {
                return Err(InferenceError::UnsupportedType(name.to_string()));
            };

            debug!("Output '{}' shape: {:?}", name, tensor.shape());
            results.push((name.to_string(), tensor));
        }

        Ok(results)
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

fn session_error(e: impl Display) -> InferenceError {
    InferenceError::Session(e.to_string())
}

fn to_session_input(tensor: &Tensor) -> Result<SessionInputValue<'static>> {
    let shape: Vec<i64> = tensor.shape().iter().map(|&s| s as i64).collect();
    let value = match tensor {
        Tensor::Float32(arr) => OrtTensor::from_array((shape, arr.iter().copied().collect::<Vec<f32>>()))
            .map(Into::into),
        Tensor::Int64(arr) => OrtTensor::from_array((shape, arr.iter().copied().collect::<Vec<i64>>()))
            .map(Into::into),
    };
    value.map_err(|e| InferenceError::InvalidInput(e.to_string()))
}

/// Copy an extracted output into an owned ndarray.
fn to_array<T: Clone>(shape: &[i64], data: &[T]) -> Result<ArrayD<T>> {
    let dims = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<std::result::Result<Vec<usize>, _>>()
        .map_err(|_| InferenceError::OutputExtraction(format!("unresolved dimension in {:?}", shape)))?;

    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
        .map_err(|e| InferenceError::ShapeMismatch(format!("output {:?}: {}", dims, e)))
}
