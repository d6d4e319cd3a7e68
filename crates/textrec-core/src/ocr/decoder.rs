//! CTC greedy decoding.

use ndarray::ArrayD;
use tracing::trace;

use crate::error::OcrError;

use super::alphabet::Alphabet;
use super::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use super::RecognitionResult;

/// Greedy (best-path) CTC decoder over a fixed alphabet.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    alphabet: Alphabet,
}

impl CtcDecoder {
    pub fn new(alphabet: Alphabet) -> Self {
        Self { alphabet }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Decode a `[1, timesteps, classes]` score tensor, logging diagnostics.
    pub fn decode(&self, data: &[f32], shape: &[usize]) -> Result<RecognitionResult, OcrError> {
        self.decode_with(data, shape, &TracingSink)
    }

    /// Decode an ndarray of shape `[1, timesteps, classes]`.
    pub fn decode_array(
        &self,
        output: &ArrayD<f32>,
        sink: &dyn DiagnosticSink,
    ) -> Result<RecognitionResult, OcrError> {
        let standard = output.as_standard_layout();
        let data = standard
            .as_slice()
            .ok_or_else(|| OcrError::Recognition("output tensor is not contiguous".to_string()))?;
        self.decode_with(data, output.shape(), sink)
    }

    /// Decode a row-major `[1, timesteps, classes]` score tensor.
    ///
    /// Symbols are collapsed against the previous raw argmax, so a blank
    /// between two identical symbols keeps both.
    pub fn decode_with(
        &self,
        data: &[f32],
        shape: &[usize],
        sink: &dyn DiagnosticSink,
    ) -> Result<RecognitionResult, OcrError> {
        let (timesteps, class_count) = self.validate_shape(data, shape)?;

        if class_count > self.alphabet.len() {
            sink.report(Diagnostic::ClassCountMismatch {
                class_count,
                alphabet_len: self.alphabet.len(),
            });
        }

        let mut text = String::new();
        let mut char_scores = Vec::new();
        let mut score_sum = 0.0f32;
        let mut last_index = 0usize;

        for (n, row) in data.chunks_exact(class_count).take(timesteps).enumerate() {
            let (argmax_idx, max_value) = argmax(row);

            let accepted = argmax_idx != 0 && !(n > 0 && argmax_idx == last_index);
            if accepted {
                match self.alphabet.get(argmax_idx) {
                    Some(label) => {
                        text.push_str(label);
                        score_sum += max_value;
                        char_scores.push(max_value);
                    }
                    None => sink.report(Diagnostic::IndexOutOfRange {
                        timestep: n,
                        index: argmax_idx,
                        alphabet_len: self.alphabet.len(),
                    }),
                }
            }

            last_index = argmax_idx;
        }

        let score = score_sum / char_scores.len().max(1) as f32;

        trace!("Decoded: '{}' (score: {:.3})", text, score);

        Ok(RecognitionResult {
            text,
            score,
            char_scores,
        })
    }

    fn validate_shape(&self, data: &[f32], shape: &[usize]) -> Result<(usize, usize), OcrError> {
        let &[batch, timesteps, class_count] = shape else {
            return Err(OcrError::ShapeMismatch(format!(
                "expected [1, timesteps, classes], got {:?}",
                shape
            )));
        };

        if batch != 1 {
            return Err(OcrError::ShapeMismatch(format!(
                "expected batch size 1, got {}",
                batch
            )));
        }
        if class_count == 0 {
            return Err(OcrError::ShapeMismatch("class axis is empty".to_string()));
        }
        if class_count < self.alphabet.len() {
            return Err(OcrError::ShapeMismatch(format!(
                "model emits {} classes but alphabet has {} labels",
                class_count,
                self.alphabet.len()
            )));
        }

        let expected = timesteps
            .checked_mul(class_count)
            .ok_or_else(|| OcrError::ShapeMismatch(format!("shape {:?} overflows", shape)))?;
        if data.len() != expected {
            return Err(OcrError::ShapeMismatch(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }

        Ok((timesteps, class_count))
    }
}

/// Index and value of the first maximum in a non-empty row.
fn argmax(row: &[f32]) -> (usize, f32) {
    let mut max_idx = 0;
    let mut max_val = row[0];
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > max_val {
            max_val = v;
            max_idx = i;
        }
    }
    (max_idx, max_val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::diagnostics::CollectingSink;
    use pretty_assertions::assert_eq;

    fn decoder() -> CtcDecoder {
        CtcDecoder::new(Alphabet::new(["#", "A", "B"]).unwrap())
    }

    /// One-hot rows with `peak` at the given class and `rest` elsewhere.
    fn tensor(classes: usize, picks: &[usize], peak: f32) -> (Vec<f32>, Vec<usize>) {
        let rest = (1.0 - peak) / (classes - 1) as f32;
        let mut data = Vec::with_capacity(picks.len() * classes);
        for &pick in picks {
            for c in 0..classes {
                data.push(if c == pick { peak } else { rest });
            }
        }
        (data, vec![1, picks.len(), classes])
    }

    #[test]
    fn test_repeats_collapse_and_blanks_drop() {
        let (data, shape) = tensor(3, &[0, 0, 1, 1, 0, 2], 0.9);
        let result = decoder().decode(&data, &shape).unwrap();

        assert_eq!(result.text, "AB");
        assert_eq!(result.char_scores.len(), 2);
    }

    #[test]
    fn test_blank_separates_repeated_symbol() {
        let (data, shape) = tensor(3, &[1, 0, 1], 0.8);
        let result = decoder().decode(&data, &shape).unwrap();

        assert_eq!(result.text, "AA");
    }

    #[test]
    fn test_repeat_compares_against_raw_previous_argmax() {
        // A B A: the middle B is accepted, so the final A is a new symbol,
        // while A A (no gap) stays collapsed.
        let (data, shape) = tensor(3, &[1, 1, 2, 1, 1], 0.7);
        let result = decoder().decode(&data, &shape).unwrap();

        assert_eq!(result.text, "ABA");
    }

    #[test]
    fn test_all_blank_is_empty_with_zero_score() {
        let (data, shape) = tensor(3, &[0, 0, 0, 0], 0.99);
        let result = decoder().decode(&data, &shape).unwrap();

        assert_eq!(result, RecognitionResult::empty());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_zero_timesteps() {
        let result = decoder().decode(&[], &[1, 0, 3]).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_score_is_mean_of_accepted_maxima() {
        let data = vec![
            0.1, 0.6, 0.3, // A (0.6)
            0.1, 0.8, 0.1, // A repeat, rejected
            0.9, 0.05, 0.05, // blank
            0.0, 0.2, 0.8, // B (0.8)
        ];
        let result = decoder().decode(&data, &[1, 4, 3]).unwrap();

        assert_eq!(result.text, "AB");
        assert_eq!(result.char_scores, vec![0.6, 0.8]);
        assert!((result.score - 0.7).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&result.score));
    }

    #[test]
    fn test_out_of_range_index_is_reported_and_skipped() {
        // Model has 4 classes, alphabet only 3: class 3 has no label.
        let (data, shape) = tensor(4, &[1, 3, 0, 2], 0.9);
        let sink = CollectingSink::new();
        let result = decoder().decode_with(&data, &shape, &sink).unwrap();

        assert_eq!(result.text, "AB");
        assert_eq!(result.char_scores.len(), 2);
        assert_eq!(
            sink.take(),
            vec![
                Diagnostic::ClassCountMismatch {
                    class_count: 4,
                    alphabet_len: 3
                },
                Diagnostic::IndexOutOfRange {
                    timestep: 1,
                    index: 3,
                    alphabet_len: 3
                },
            ]
        );
    }

    #[test]
    fn test_ties_pick_first_index() {
        let data = vec![0.5, 0.5, 0.0];
        let result = decoder().decode(&data, &[1, 1, 3]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_shape_errors() {
        let decoder = decoder();

        assert!(matches!(
            decoder.decode(&[0.0; 6], &[2, 3]),
            Err(OcrError::ShapeMismatch(_))
        ));
        assert!(matches!(
            decoder.decode(&[0.0; 6], &[2, 1, 3]),
            Err(OcrError::ShapeMismatch(_))
        ));
        assert!(matches!(
            decoder.decode(&[0.0; 4], &[1, 2, 2]),
            Err(OcrError::ShapeMismatch(_))
        ));
        assert!(matches!(
            decoder.decode(&[0.0; 5], &[1, 2, 3]),
            Err(OcrError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_decode_array_handles_non_standard_layout() {
        // Build [classes, timesteps] and transpose into a [timesteps, classes] view.
        let scores = ndarray::array![[0.1f32, 0.9, 0.1], [0.8, 0.05, 0.1], [0.1, 0.05, 0.8]];
        let transposed = scores.t().insert_axis(ndarray::Axis(0)).into_dyn().to_owned();

        let sink = CollectingSink::new();
        let result = decoder().decode_array(&transposed, &sink).unwrap();

        // Rows after transposition: [0.1, 0.8, 0.1] -> A, [0.9, 0.05, 0.05] -> blank, [0.1, 0.1, 0.8] -> B
        assert_eq!(result.text, "AB");
        assert!(sink.take().is_empty());
    }
}
