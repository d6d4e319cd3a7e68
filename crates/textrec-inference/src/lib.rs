//! Inference adapter layer for textrec.
//!
//! The recognition core only needs a synchronous "tensor in, tensor out"
//! capability. This crate defines that boundary and ships backends for it:
//! - `ort` with XNNPACK execution provider for native platforms
//! - `tract` for static-shape models (pure Rust)
//! - [`FnBackend`] for plugging in any closure (remote services, test doubles)

mod backend;
mod error;
mod tensor;

pub use backend::{FnBackend, InferenceBackend};
pub use error::InferenceError;
pub use tensor::{InputTensor, OutputTensor, Tensor, TensorType};

#[cfg(feature = "native")]
pub use backend::ort::{OrtBackend, OrtOptions};

#[cfg(feature = "tract")]
pub use backend::tract::TractBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
