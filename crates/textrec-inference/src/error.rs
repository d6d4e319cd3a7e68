//! Error types for the inference layer.

use thiserror::Error;

/// Errors raised by an inference backend.
///
/// The recognition core treats every variant as a failure of the adapter
/// itself and aborts the batch.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to configure session: {0}")]
    Session(String),

    /// The session mutex was poisoned by a panicking caller.
    #[error("session is unusable after a previous panic")]
    SessionPoisoned,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Data length or dimensions do not match the expected shape.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("failed to extract output: {0}")]
    OutputExtraction(String),

    /// The model produced an element type other than float32 / int64.
    #[error("unsupported element type for output '{0}'")]
    UnsupportedType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
