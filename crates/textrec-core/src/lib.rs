//! Core library for text-line recognition.
//!
//! This crate provides:
//! - Perspective rectification of detector quadrilaterals into upright crops
//! - Recognition preprocessing (resize, normalize, planar packing)
//! - CTC greedy decoding against an immutable alphabet
//! - An orchestrator that runs the whole pipeline over one image

pub mod error;
pub mod models;
pub mod ocr;

pub use error::{OcrError, Result, TextrecError};
pub use models::config::{
    ClassifierConfig, ModelConfig, RecognitionConfig, RuntimeConfig, TextrecConfig, WidthPolicy,
};
pub use ocr::{
    Alphabet, AngleClassifier, CollectingSink, CtcDecoder, Diagnostic, DiagnosticSink, ItemResult,
    OrientationClassifier, Point, PreparedInput, Quad, RecognitionEngine, RecognitionEngineBuilder,
    RecognitionPreprocessor, RecognitionResult, TextRecognizer, TracingSink, rectify,
};
#[cfg(feature = "native")]
pub use ocr::create_engine_from_dir;

/// Re-export inference types.
pub use textrec_inference::{
    FnBackend, InferenceBackend, InferenceError, InputTensor, OutputTensor, Tensor, TensorType,
};

#[cfg(feature = "native")]
pub use textrec_inference::{OrtBackend, OrtOptions};

#[cfg(feature = "tract")]
pub use textrec_inference::TractBackend;
