//! Recognition engine orchestrating rectification, classification and recognition.

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};

use crate::error::{OcrError, TextrecError};
use textrec_inference::InferenceBackend;

use super::{
    classifier::OrientationClassifier,
    diagnostics::{Diagnostic, DiagnosticSink, TracingSink},
    recognizer::TextRecognizer,
    rectify::rectify,
    Quad, RecognitionResult,
};

/// Outcome for one quadrilateral; failures stay in their slot.
pub type ItemResult = std::result::Result<RecognitionResult, OcrError>;

/// Runs the recognition pipeline over the text regions of one image.
pub struct RecognitionEngine<B: InferenceBackend> {
    recognizer: TextRecognizer<B>,
    classifier: Option<Box<dyn OrientationClassifier>>,
    sink: Arc<dyn DiagnosticSink>,
}

/// Builder for RecognitionEngine.
pub struct RecognitionEngineBuilder<B: InferenceBackend> {
    recognizer: TextRecognizer<B>,
    classifier: Option<Box<dyn OrientationClassifier>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl<B: InferenceBackend> RecognitionEngineBuilder<B> {
    /// Create a new builder around a text recognizer.
    pub fn new(recognizer: TextRecognizer<B>) -> Self {
        Self {
            recognizer,
            classifier: None,
            sink: Arc::new(TracingSink),
        }
    }

    /// Set the orientation classifier used by [`RecognitionEngine::run_batch`].
    pub fn with_classifier(mut self, classifier: impl OrientationClassifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Set the diagnostic sink. Defaults to [`TracingSink`].
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the recognition engine.
    pub fn build(self) -> RecognitionEngine<B> {
        RecognitionEngine {
            recognizer: self.recognizer,
            classifier: self.classifier,
            sink: self.sink,
        }
    }
}

impl<B: InferenceBackend> RecognitionEngine<B> {
    /// Create a new builder.
    pub fn builder(recognizer: TextRecognizer<B>) -> RecognitionEngineBuilder<B> {
        RecognitionEngineBuilder::new(recognizer)
    }

    pub fn recognizer(&self) -> &TextRecognizer<B> {
        &self.recognizer
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Recognize every quad using the engine's own classifier, if any.
    pub fn run_batch(&self, quads: &[Quad], image: &RgbImage) -> crate::Result<Vec<ItemResult>> {
        self.run_batch_with(quads, image, self.classifier.as_deref())
    }

    /// Recognize every quad in input order.
    ///
    /// The output has exactly one entry per quad. An item that fails holds its
    /// [`OcrError`] and the batch continues; an inference failure aborts the
    /// batch and is returned as the error.
    pub fn run_batch_with(
        &self,
        quads: &[Quad],
        image: &RgbImage,
        classifier: Option<&dyn OrientationClassifier>,
    ) -> crate::Result<Vec<ItemResult>> {
        if quads.is_empty() {
            self.sink.report(Diagnostic::EmptyBatch);
            return Ok(Vec::new());
        }

        let start = Instant::now();
        debug!(
            "Recognizing {} regions in {}x{} image",
            quads.len(),
            image.width(),
            image.height()
        );

        let mut results = Vec::with_capacity(quads.len());
        let mut failed = 0usize;

        for (index, quad) in quads.iter().enumerate() {
            match self.recognize_quad(index, quad, image, classifier) {
                Ok(result) => results.push(Ok(result)),
                Err(TextrecError::Inference(err)) => return Err(err.into()),
                Err(err) => {
                    let err = match err {
                        TextrecError::Ocr(err) => err,
                        other => OcrError::Recognition(other.to_string()),
                    };
                    self.sink.report(Diagnostic::ItemFailed {
                        index,
                        reason: err.to_string(),
                    });
                    failed += 1;
                    results.push(Err(err));
                }
            }
        }

        info!(
            "Recognized {} regions ({} failed) in {}ms",
            results.len(),
            failed,
            start.elapsed().as_millis()
        );

        Ok(results)
    }

    /// Recognize every quad and return one `(text, score)` pair per quad.
    ///
    /// Failed items yield empty text with a score of 0.
    pub fn run_batch_texts(
        &self,
        quads: &[Quad],
        image: &RgbImage,
    ) -> crate::Result<Vec<(String, f32)>> {
        let results = self.run_batch(quads, image)?;
        Ok(results
            .into_iter()
            .map(|item| match item {
                Ok(result) => (result.text, result.score),
                Err(_) => (String::new(), 0.0),
            })
            .collect())
    }

    fn recognize_quad(
        &self,
        index: usize,
        quad: &Quad,
        image: &RgbImage,
        classifier: Option<&dyn OrientationClassifier>,
    ) -> crate::Result<RecognitionResult> {
        let mut crop = rectify(image, quad);

        if crop.width() == 0 || crop.height() == 0 {
            self.sink.report(Diagnostic::DegenerateQuad { index });
        } else if let Some(classifier) = classifier {
            crop = classifier.run(crop).map_err(|err| match err {
                TextrecError::Inference(_) | TextrecError::Ocr(_) => err,
                other => OcrError::Classification(other.to_string()).into(),
            })?;
        }

        self.recognizer.recognize(&crop, self.sink.as_ref())
    }
}

/// Convenience function to create a recognition engine with models from a directory.
///
/// The classifier is attached only when enabled in `config` and its model
/// file exists.
#[cfg(feature = "native")]
pub fn create_engine_from_dir(
    model_dir: &std::path::Path,
    config: &crate::TextrecConfig,
) -> crate::Result<RecognitionEngine<crate::OrtBackend>> {
    use super::alphabet::Alphabet;
    use super::classifier::AngleClassifier;
    use crate::OrtBackend;

    let rec_path = model_dir.join(&config.models.recognition_model);
    let cls_path = model_dir.join(&config.models.classification_model);
    let dict_path = model_dir.join(&config.models.dictionary);
    let threads = config.runtime.num_threads;

    if !rec_path.exists() {
        return Err(OcrError::ModelLoad(format!(
            "recognition model not found: {}",
            rec_path.display()
        ))
        .into());
    }

    let alphabet = Alphabet::from_file(&dict_path, config.models.use_space_char)?;
    let backend = OrtBackend::from_file_with_threads(&rec_path, threads)?;
    debug!("Loaded recognizer from {}", rec_path.display());

    let recognizer = TextRecognizer::new(backend, alphabet, config.recognition.clone());
    let mut builder = RecognitionEngine::builder(recognizer);

    if config.classifier.enabled && cls_path.exists() {
        let backend = OrtBackend::from_file_with_threads(&cls_path, threads)?;
        builder = builder.with_classifier(AngleClassifier::from_config(backend, &config.classifier));
        debug!("Loaded classifier from {}", cls_path.display());
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::RecognitionConfig;
    use crate::ocr::alphabet::Alphabet;
    use crate::ocr::diagnostics::CollectingSink;
    use image::{imageops, Rgb};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use textrec_inference::{FnBackend, InferenceError, InputTensor, OutputTensor};

    type Model = Box<dyn Fn(&InputTensor) -> textrec_inference::Result<OutputTensor> + Send + Sync>;

    /// Fake model reading the mean of the first input channel: dark crops
    /// spell "A", bright crops spell "B".
    fn brightness_model(calls: Arc<AtomicUsize>) -> Model {
        Box::new(move |input: &InputTensor| {
            calls.fetch_add(1, Ordering::SeqCst);
            let tensor = input.as_f32().ok_or_else(|| {
                InferenceError::InvalidInput("expected float32".to_string())
            })?;
            let mean = tensor.mean().unwrap_or(0.0);
            let class = if mean < 0.0 { 1 } else { 2 };
            let mut scores = vec![0.05f32; 3];
            scores[class] = 0.9;
            OutputTensor::from_f32(scores, vec![1, 1, 3])
        })
    }

    fn engine_with(model: Model, sink: Arc<CollectingSink>) -> RecognitionEngine<FnBackend<Model>> {
        let recognizer = TextRecognizer::new(
            FnBackend::new(model),
            Alphabet::new(["#", "A", "B"]).unwrap(),
            RecognitionConfig::default(),
        );
        RecognitionEngine::builder(recognizer).with_sink(sink).build()
    }

    /// Left half black, right half white.
    fn split_image() -> RgbImage {
        RgbImage::from_fn(80, 20, |x, _| {
            if x < 40 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        })
    }

    #[test]
    fn test_results_follow_input_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CollectingSink::new());
        let engine = engine_with(brightness_model(calls.clone()), sink.clone());

        let quads = [
            Quad::from_rect(40, 0, 40, 20),
            Quad::from_rect(0, 0, 40, 20),
            Quad::from_rect(50, 5, 20, 10),
        ];
        let results = engine.run_batch(&quads, &split_image()).unwrap();

        let texts: Vec<_> = results
            .iter()
            .map(|r| r.as_ref().map(|r| r.text.as_str()).unwrap())
            .collect();
        assert_eq!(texts, vec!["B", "A", "B"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_empty_batch_skips_inference() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CollectingSink::new());
        let engine = engine_with(brightness_model(calls.clone()), sink.clone());

        let results = engine.run_batch(&[], &split_image()).unwrap();

        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.take(), vec![Diagnostic::EmptyBatch]);
    }

    #[test]
    fn test_item_failure_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // Second call returns a malformed output
        let model: Model = Box::new(move |_: &InputTensor| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                OutputTensor::from_f32(vec![0.0; 2], vec![1, 2])
            } else {
                OutputTensor::from_f32(vec![0.1, 0.8, 0.1], vec![1, 1, 3])
            }
        });
        let sink = Arc::new(CollectingSink::new());
        let engine = engine_with(model, sink.clone());

        let quads = [
            Quad::from_rect(0, 0, 10, 10),
            Quad::from_rect(10, 0, 10, 10),
            Quad::from_rect(20, 0, 10, 10),
        ];
        let results = engine.run_batch(&quads, &split_image()).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().text, "A");
        assert!(matches!(results[1], Err(OcrError::ShapeMismatch(_))));
        assert_eq!(results[2].as_ref().unwrap().text, "A");

        let diagnostics = sink.take();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(diagnostics[0], Diagnostic::ItemFailed { index: 1, .. }));
    }

    #[test]
    fn test_inference_failure_aborts_batch() {
        let model: Model = Box::new(|_: &InputTensor| {
            Err(InferenceError::InferenceFailed("out of memory".to_string()))
        });
        let engine = engine_with(model, Arc::new(CollectingSink::new()));

        let err = engine
            .run_batch(&[Quad::from_rect(0, 0, 10, 10)], &split_image())
            .unwrap_err();
        assert!(matches!(err, TextrecError::Inference(_)));
    }

    #[test]
    fn test_degenerate_quad_is_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CollectingSink::new());
        let engine = engine_with(brightness_model(calls.clone()), sink.clone());

        let quads = [Quad::from_rect(200, 200, 10, 10), Quad::from_rect(0, 0, 10, 10)];
        let results = engine.run_batch(&quads, &split_image()).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap().text, "A");
        assert_eq!(sink.take(), vec![Diagnostic::DegenerateQuad { index: 0 }]);
    }

    #[test]
    fn test_classifier_is_applied() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CollectingSink::new());
        let engine = engine_with(brightness_model(calls), sink);

        // Inverting the crop turns dark text into bright text
        let invert = |mut crop: RgbImage| -> crate::Result<RgbImage> {
            imageops::invert(&mut crop);
            Ok(crop)
        };

        let quads = [Quad::from_rect(0, 0, 40, 20)];
        let plain = engine.run_batch(&quads, &split_image()).unwrap();
        let inverted = engine
            .run_batch_with(&quads, &split_image(), Some(&invert))
            .unwrap();

        assert_eq!(plain[0].as_ref().unwrap().text, "A");
        assert_eq!(inverted[0].as_ref().unwrap().text, "B");
    }

    #[test]
    fn test_classifier_error_is_item_local() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CollectingSink::new());
        let engine = engine_with(brightness_model(calls.clone()), sink.clone());

        let seen = AtomicUsize::new(0);
        let flaky = |crop: RgbImage| -> crate::Result<RgbImage> {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TextrecError::Config("angle table missing".to_string()))
            } else {
                Ok(crop)
            }
        };

        let quads = [Quad::from_rect(0, 0, 10, 10), Quad::from_rect(50, 0, 10, 10)];
        let results = engine
            .run_batch_with(&quads, &split_image(), Some(&flaky))
            .unwrap();

        assert!(matches!(results[0], Err(OcrError::Classification(_))));
        assert_eq!(results[1].as_ref().unwrap().text, "B");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let reported = sink.take();
        assert_eq!(reported.len(), 1);
        assert!(matches!(reported[0], Diagnostic::ItemFailed { index: 0, .. }));
    }

    #[test]
    fn test_run_batch_texts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model: Model = Box::new(move |_: &InputTensor| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                OutputTensor::from_f32(vec![0.0; 2], vec![1, 2])
            } else {
                OutputTensor::from_f32(vec![0.1, 0.1, 0.8], vec![1, 1, 3])
            }
        });
        let recognizer = TextRecognizer::new(
            FnBackend::new(model),
            Alphabet::new(["#", "A", "B"]).unwrap(),
            RecognitionConfig::default(),
        );
        let invert = |mut crop: RgbImage| -> crate::Result<RgbImage> {
            imageops::invert(&mut crop);
            Ok(crop)
        };
        let engine = RecognitionEngine::builder(recognizer)
            .with_classifier(invert)
            .with_sink(Arc::new(CollectingSink::new()))
            .build();

        assert!(engine.has_classifier());

        let quads = [Quad::from_rect(0, 0, 10, 10), Quad::from_rect(10, 0, 10, 10)];
        let texts = engine.run_batch_texts(&quads, &split_image()).unwrap();

        assert_eq!(texts, vec![(String::new(), 0.0), ("B".to_string(), 0.8)]);
    }
}
