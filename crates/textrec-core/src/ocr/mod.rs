//! Text-line recognition pipeline.

mod alphabet;
mod classifier;
mod decoder;
mod diagnostics;
mod engine;
mod preprocessing;
mod recognizer;
mod rectify;

pub use alphabet::Alphabet;
pub use classifier::{AngleClassifier, OrientationClassifier};
pub use decoder::CtcDecoder;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};
pub use engine::{ItemResult, RecognitionEngine, RecognitionEngineBuilder};
pub use preprocessing::{PreparedInput, RecognitionPreprocessor};
pub use recognizer::TextRecognizer;
pub use rectify::rectify;

#[cfg(feature = "native")]
pub use engine::create_engine_from_dir;

use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// An integer image coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy)
    }
}

/// A text region as four corners: top-left, top-right, bottom-right, bottom-left.
///
/// Deserializes from `[[x, y], [x, y], [x, y], [x, y]]`; float coordinates
/// are rounded to the nearest pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f32; 2]>", into = "Vec<[i32; 2]>")]
pub struct Quad {
    points: [Point; 4],
}

impl Quad {
    /// Create a quad from four already-ordered points.
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Create a quad from an axis-aligned rectangle.
    ///
    /// Corners past the `i32` range saturate.
    pub fn from_rect(left: i32, top: i32, width: i32, height: i32) -> Self {
        let right = left.saturating_add(width);
        let bottom = top.saturating_add(height);
        Self::new([
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ])
    }

    /// Create a quad from untyped `[x, y]` pairs.
    pub fn from_points(points: &[[f32; 2]]) -> Result<Self, OcrError> {
        if points.len() != 4 {
            return Err(OcrError::InvalidQuad(format!(
                "expected 4 points, got {}",
                points.len()
            )));
        }

        let mut out = [Point::new(0, 0); 4];
        for (i, [x, y]) in points.iter().enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(OcrError::InvalidQuad(format!(
                    "point {} has non-finite coordinates ({}, {})",
                    i, x, y
                )));
            }
            if x.abs() >= i32::MAX as f32 || y.abs() >= i32::MAX as f32 {
                return Err(OcrError::InvalidQuad(format!(
                    "point {} is out of range ({}, {})",
                    i, x, y
                )));
            }
            out[i] = Point::new(x.round() as i32, y.round() as i32);
        }

        Ok(Self::new(out))
    }

    /// Create a quad from a flat detector box `(x1, y1, x2, y2, x3, y3, x4, y4)`.
    pub fn from_bbox(bbox: &[f32; 8]) -> Result<Self, OcrError> {
        let points: Vec<[f32; 2]> = bbox.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        Self::from_points(&points)
    }

    /// The four corners in order.
    pub fn points(&self) -> &[Point; 4] {
        &self.points
    }

    /// Axis-aligned bounds as `(left, top, right, bottom)`.
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        let xs = self.points.iter().map(|p| p.x);
        let ys = self.points.iter().map(|p| p.y);
        (
            xs.clone().min().unwrap_or(0),
            ys.clone().min().unwrap_or(0),
            xs.max().unwrap_or(0),
            ys.max().unwrap_or(0),
        )
    }

    /// Enclosed area (shoelace formula); zero for collinear corners.
    pub fn area(&self) -> f64 {
        let doubled: i128 = (0..4)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % 4];
                a.x as i128 * b.y as i128 - b.x as i128 * a.y as i128
            })
            .sum();
        doubled.abs() as f64 / 2.0
    }
}

impl TryFrom<Vec<[f32; 2]>> for Quad {
    type Error = OcrError;

    fn try_from(points: Vec<[f32; 2]>) -> Result<Self, Self::Error> {
        Self::from_points(&points)
    }
}

impl From<Quad> for Vec<[i32; 2]> {
    fn from(quad: Quad) -> Self {
        quad.points.iter().map(|p| [p.x, p.y]).collect()
    }
}

/// Recognized text for one quadrilateral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Decoded text.
    pub text: String,

    /// Mean confidence of the accepted timesteps (0.0 when nothing was accepted).
    pub score: f32,

    /// Per-character confidences, aligned with the accepted symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub char_scores: Vec<f32>,
}

impl RecognitionResult {
    /// Result for a crop that produced no symbols.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if no text was decoded.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
