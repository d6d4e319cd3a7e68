//! Text recognition using a CTC recognition model.

use image::RgbImage;
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::RecognitionConfig;
use textrec_inference::{InferenceBackend, InputTensor};

use super::alphabet::Alphabet;
use super::decoder::CtcDecoder;
use super::diagnostics::DiagnosticSink;
use super::preprocessing::RecognitionPreprocessor;
use super::RecognitionResult;

/// Text recognizer: preprocessing, one model call and CTC decoding.
pub struct TextRecognizer<B: InferenceBackend> {
    backend: B,
    preprocessor: RecognitionPreprocessor,
    decoder: CtcDecoder,
}

impl<B: InferenceBackend> TextRecognizer<B> {
    /// Create a new text recognizer.
    pub fn new(backend: B, alphabet: Alphabet, config: RecognitionConfig) -> Self {
        Self {
            backend,
            preprocessor: RecognitionPreprocessor::new(config),
            decoder: CtcDecoder::new(alphabet),
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        self.decoder.alphabet()
    }

    pub fn preprocessor(&self) -> &RecognitionPreprocessor {
        &self.preprocessor
    }

    /// Recognize the text in one rectified crop.
    ///
    /// Backend failures are returned as [`crate::TextrecError::Inference`];
    /// everything else is an item-level [`OcrError`].
    pub fn recognize(
        &self,
        crop: &RgbImage,
        sink: &dyn DiagnosticSink,
    ) -> crate::Result<RecognitionResult> {
        let prepared = self.preprocessor.prepare(crop)?;
        debug!("Recognition input shape: {:?}", prepared.shape());

        let output = self
            .backend
            .run_single(InputTensor::from(prepared.tensor))?;

        let scores = output
            .into_f32()
            .ok_or_else(|| OcrError::Recognition("expected float32 output".to_string()))?;
        debug!("Recognition output shape: {:?}", scores.shape());

        Ok(self.decoder.decode_array(&scores, sink)?)
    }
}
