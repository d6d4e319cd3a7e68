//! Configuration structures for the recognition pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TextrecError;

/// Main configuration for the textrec pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextrecConfig {
    /// Recognition preprocessing configuration.
    pub recognition: RecognitionConfig,

    /// Orientation classifier configuration.
    pub classifier: ClassifierConfig,

    /// Model configuration.
    pub models: ModelConfig,

    /// Inference runtime configuration.
    pub runtime: RuntimeConfig,
}

/// What to do with crops whose aspect-preserving width exceeds `max_width`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WidthPolicy {
    /// Resize non-proportionally to exactly `max_width`.
    #[default]
    Squeeze,
    /// Keep the aspect-preserving resize and drop columns past `max_width`.
    Crop,
}

/// Recognition input configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Fixed input height of the sequence model.
    pub image_height: u32,

    /// Upper bound on the input width.
    pub max_width: u32,

    /// Policy for crops wider than `max_width`.
    pub width_policy: WidthPolicy,

    /// Force every crop to this width regardless of aspect ratio
    /// (static-shape engines).
    pub fixed_width: Option<u32>,

    /// Per-channel mean subtracted after scaling.
    pub mean: [f32; 3],

    /// Per-channel multiplier applied after mean subtraction.
    pub scale: [f32; 3],

    /// Divide pixel values by 255 before normalization.
    pub is_scale: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            image_height: 32,
            max_width: 320,
            width_policy: WidthPolicy::Squeeze,
            fixed_width: None,
            mean: [0.5, 0.5, 0.5],
            scale: [2.0, 2.0, 2.0],
            is_scale: true,
        }
    }
}

/// Text direction classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Run the classifier when a model is available.
    pub enabled: bool,

    /// Minimum score for the 180 degree label to trigger a rotation.
    pub threshold: f32,

    /// Classifier input height.
    pub image_height: u32,

    /// Classifier input width (crops are padded up to it).
    pub image_width: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.9,
            image_height: 48,
            image_width: 192,
        }
    }
}

/// Model file locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Direction classification model file name (optional at runtime).
    pub classification_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Append a space label after the dictionary entries.
    pub use_space_char: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            recognition_model: "rec.onnx".to_string(),
            classification_model: "cls.onnx".to_string(),
            dictionary: "dict.txt".to_string(),
            use_space_char: true,
        }
    }
}

/// Inference runtime settings handed to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of intra-op CPU threads.
    pub num_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { num_threads: 4 }
    }
}

impl TextrecConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, TextrecError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| TextrecError::Config(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), TextrecError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| TextrecError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
