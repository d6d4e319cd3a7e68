//! Error types for the textrec-core library.

use thiserror::Error;

/// Main error type for the textrec library.
///
/// `Ocr` errors are local to one recognition item; the orchestrator records
/// them in that item's slot and keeps going. `Inference` errors mean the
/// adapter itself is unusable and abort the whole batch.
#[derive(Error, Debug)]
pub enum TextrecError {
    /// Item-level recognition error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Inference error from the adapter layer.
    #[error("inference error: {0}")]
    Inference(#[from] textrec_inference::InferenceError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors scoped to a single quadrilateral / crop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    /// The quadrilateral violates the 4-point, finite-coordinate contract.
    #[error("invalid quadrilateral: {0}")]
    InvalidQuad(String),

    /// Model output shape does not fit the decoder contract.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Orientation classification failed.
    #[error("orientation classification failed: {0}")]
    Classification(String),

    /// Failed to load a model resource (alphabet, model file).
    #[error("failed to load model: {0}")]
    ModelLoad(String),
}

/// Result type for the textrec library.
pub type Result<T> = std::result::Result<T, TextrecError>;
