//! Text orientation (0 / 180 degree) classification.

use image::{imageops, RgbImage};
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::ClassifierConfig;
use textrec_inference::{InferenceBackend, InputTensor};

use super::preprocessing::RecognitionPreprocessor;

/// Optional stage that may turn a rectified crop upside down before recognition.
///
/// Implementations take ownership of the crop and hand back the crop to
/// recognize. Any `Fn(RgbImage) -> Result<RgbImage>` closure qualifies.
pub trait OrientationClassifier: Send + Sync {
    fn run(&self, crop: RgbImage) -> crate::Result<RgbImage>;
}

impl<F> OrientationClassifier for F
where
    F: Fn(RgbImage) -> crate::Result<RgbImage> + Send + Sync,
{
    fn run(&self, crop: RgbImage) -> crate::Result<RgbImage> {
        self(crop)
    }
}

/// Angle classifier backed by a direction classification model.
pub struct AngleClassifier<B: InferenceBackend> {
    backend: B,
    preprocessor: RecognitionPreprocessor,
    threshold: f32,
    input_height: u32,
    input_width: u32,
}

impl<B: InferenceBackend> AngleClassifier<B> {
    /// Create a new angle classifier with default settings.
    pub fn new(backend: B) -> Self {
        Self::from_config(backend, &ClassifierConfig::default())
    }

    /// Create an angle classifier from classifier settings.
    pub fn from_config(backend: B, config: &ClassifierConfig) -> Self {
        Self {
            backend,
            preprocessor: RecognitionPreprocessor::default(),
            threshold: config.threshold,
            input_height: config.image_height,
            input_width: config.image_width,
        }
    }

    /// Set classification threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the padded model input size.
    pub fn with_input_size(mut self, height: u32, width: u32) -> Self {
        self.input_height = height;
        self.input_width = width;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify the orientation of a crop.
    ///
    /// Returns (angle, confidence) where angle is 0 or 180.
    pub fn classify(&self, crop: &RgbImage) -> crate::Result<(i32, f32)> {
        let prepared = self
            .preprocessor
            .prepare_padded(crop, self.input_height, self.input_width)?;

        let output = self
            .backend
            .run_single(InputTensor::from(prepared.tensor))?;

        let scores = output
            .into_f32()
            .ok_or_else(|| OcrError::Classification("expected float32 output".to_string()))?;
        let scores = scores.as_standard_layout();
        let scores = scores
            .as_slice()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OcrError::Classification("classifier produced no scores".to_string()))?;

        // First maximum wins
        let (label, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, scores[0]), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        let angle = if label % 2 == 1 { 180 } else { 0 };
        debug!("Classified angle: {}° (confidence: {:.3})", angle, confidence);

        Ok((angle, confidence))
    }

    /// Check if a crop needs rotation based on classification.
    pub fn needs_rotation(&self, crop: &RgbImage) -> crate::Result<bool> {
        let (angle, confidence) = self.classify(crop)?;
        Ok(angle == 180 && confidence > self.threshold)
    }
}

impl<B: InferenceBackend> OrientationClassifier for AngleClassifier<B> {
    fn run(&self, crop: RgbImage) -> crate::Result<RgbImage> {
        if self.needs_rotation(&crop)? {
            Ok(imageops::rotate180(&crop))
        } else {
            Ok(crop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TextrecError;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use textrec_inference::{FnBackend, InferenceError, OutputTensor};

    fn scores(values: [f32; 2]) -> impl Fn(&InputTensor) -> textrec_inference::Result<OutputTensor> {
        move |input: &InputTensor| {
            assert_eq!(input.shape(), &[1, 3, 48, 192]);
            OutputTensor::from_f32(values.to_vec(), vec![1, 2])
        }
    }

    fn marked_crop() -> RgbImage {
        let mut crop = RgbImage::new(40, 10);
        crop.put_pixel(0, 0, Rgb([255, 0, 0]));
        crop
    }

    #[test]
    fn test_confident_upside_down_is_rotated() {
        let classifier = AngleClassifier::new(FnBackend::new(scores([0.05, 0.95])));

        assert_eq!(classifier.classify(&marked_crop()).unwrap(), (180, 0.95));

        let rotated = classifier.run(marked_crop()).unwrap();
        assert_eq!(rotated.dimensions(), (40, 10));
        assert_eq!(rotated.get_pixel(39, 9), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_below_threshold_is_kept() {
        let classifier = AngleClassifier::new(FnBackend::new(scores([0.15, 0.85])));

        let crop = classifier.run(marked_crop()).unwrap();
        assert_eq!(crop, marked_crop());

        let lowered = AngleClassifier::new(FnBackend::new(scores([0.15, 0.85]))).with_threshold(0.8);
        assert!(lowered.needs_rotation(&marked_crop()).unwrap());
    }

    #[test]
    fn test_upright_is_kept() {
        let classifier = AngleClassifier::new(FnBackend::new(scores([0.99, 0.01])));

        assert_eq!(classifier.classify(&marked_crop()).unwrap(), (0, 0.99));
        assert_eq!(classifier.run(marked_crop()).unwrap(), marked_crop());
    }

    #[test]
    fn test_custom_input_size() {
        let classifier = AngleClassifier::new(FnBackend::new(|input: &InputTensor| {
            assert_eq!(input.shape(), &[1, 3, 32, 100]);
            OutputTensor::from_f32(vec![0.02, 0.98], vec![1, 2])
        }))
        .with_input_size(32, 100);

        assert_eq!(classifier.classify(&marked_crop()).unwrap(), (180, 0.98));
    }

    #[test]
    fn test_backend_failure_is_inference_error() {
        let classifier = AngleClassifier::new(FnBackend::new(|_: &InputTensor| {
            Err(InferenceError::InferenceFailed("boom".to_string()))
        }));

        let err = classifier.run(marked_crop()).unwrap_err();
        assert!(matches!(err, TextrecError::Inference(_)));
    }

    #[test]
    fn test_empty_scores_are_item_error() {
        let classifier = AngleClassifier::new(FnBackend::new(|_: &InputTensor| {
            OutputTensor::from_f32(vec![], vec![1, 0])
        }));

        let err = classifier.classify(&marked_crop()).unwrap_err();
        assert!(matches!(err, TextrecError::Ocr(OcrError::Classification(_))));
    }

    #[test]
    fn test_closure_classifier() {
        let flip = |crop: RgbImage| -> crate::Result<RgbImage> { Ok(imageops::flip_horizontal(&crop)) };
        let classifier: &dyn OrientationClassifier = &flip;

        let out = classifier.run(marked_crop()).unwrap();
        assert_eq!(out.get_pixel(39, 0), &Rgb([255, 0, 0]));
    }
}
