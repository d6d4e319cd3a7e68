//! Configuration models.

pub mod config;

pub use config::{ClassifierConfig, ModelConfig, RecognitionConfig, RuntimeConfig, TextrecConfig, WidthPolicy};
