//! Inference backend implementations.

#[cfg(feature = "native")]
pub mod ort;

#[cfg(feature = "tract")]
pub mod tract;

use crate::error::InferenceError;
use crate::{InputTensor, OutputTensor, Result};

/// Trait for inference backends.
///
/// Backends are synchronous and stateless per call: the caller hands over a
/// packed input tensor and blocks until the output tensor is available.
/// Timeouts and cancellation are the caller's concern.
pub trait InferenceBackend: Send + Sync {
    /// Run inference with the given inputs.
    ///
    /// # Arguments
    /// * `inputs` - Named input tensors
    ///
    /// # Returns
    /// Named output tensors from the model
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>>;

    /// Get the input names expected by the model.
    fn input_names(&self) -> &[String];

    /// Get the output names produced by the model.
    fn output_names(&self) -> &[String];

    /// Feed a single tensor to the first model input and return the first output.
    fn run_single(&self, input: InputTensor) -> Result<OutputTensor> {
        let name = self
            .input_names()
            .first()
            .map(String::as_str)
            .unwrap_or("x")
            .to_string();

        self.run(&[(name.as_str(), input)])?
            .into_iter()
            .next()
            .map(|(_, tensor)| tensor)
            .ok_or_else(|| InferenceError::OutputExtraction("model produced no outputs".to_string()))
    }
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for Box<T> {
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        (**self).run(inputs)
    }

    fn input_names(&self) -> &[String] {
        (**self).input_names()
    }

    fn output_names(&self) -> &[String] {
        (**self).output_names()
    }
}

/// Backend wrapping a closure from one input tensor to one output tensor.
///
/// Useful for remote inference services, hand-written models and tests.
pub struct FnBackend<F> {
    func: F,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl<F> FnBackend<F>
where
    F: Fn(&InputTensor) -> Result<OutputTensor> + Send + Sync,
{
    /// Wrap `func` as a single-input, single-output backend.
    pub fn new(func: F) -> Self {
        Self {
            func,
            input_names: vec!["x".to_string()],
            output_names: vec!["output".to_string()],
        }
    }
}

impl<F> InferenceBackend for FnBackend<F>
where
    F: Fn(&InputTensor) -> Result<OutputTensor> + Send + Sync,
{
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        let (_, tensor) = inputs
            .first()
            .ok_or_else(|| InferenceError::InvalidInput("no input tensor given".to_string()))?;

        let output = (self.func)(tensor)?;
        Ok(vec![(self.output_names[0].clone(), output)])
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
