//! Recognition alphabet (CTC label table).

use std::ops::Index;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::OcrError;

/// Label stored at index 0; never emitted by the decoder.
pub const BLANK_LABEL: &str = "#";

/// Immutable, shareable label table. Index 0 is the CTC blank.
///
/// Cloning is cheap: all clones share the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    labels: Arc<[String]>,
}

impl Alphabet {
    /// Create an alphabet from a complete label list whose first entry is the blank.
    pub fn new<I, S>(labels: I) -> Result<Self, OcrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(OcrError::ModelLoad(
                "alphabet must contain at least the blank label".to_string(),
            ));
        }

        Ok(Self {
            labels: labels.into(),
        })
    }

    /// Build an alphabet from dictionary text with one label per line.
    ///
    /// The blank label is inserted at index 0, and a `" "` label is appended
    /// after the dictionary entries when `use_space_char` is set. Every line
    /// keeps its index, empty lines included.
    pub fn from_dictionary(content: &str, use_space_char: bool) -> Self {
        let mut labels = vec![BLANK_LABEL.to_string()];
        labels.extend(
            content
                .lines()
                .map(|line| line.strip_suffix('\r').unwrap_or(line))
                .map(str::to_string),
        );
        if use_space_char {
            labels.push(" ".to_string());
        }

        Self {
            labels: labels.into(),
        }
    }

    /// Load a dictionary file (see [`Alphabet::from_dictionary`]).
    pub fn from_file(path: &Path, use_space_char: bool) -> Result<Self, OcrError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OcrError::ModelLoad(format!("Failed to load dictionary {}: {}", path.display(), e)))?;

        let alphabet = Self::from_dictionary(&content, use_space_char);
        debug!(
            "Loaded dictionary with {} labels from {}",
            alphabet.len(),
            path.display()
        );
        Ok(alphabet)
    }

    /// Number of labels including the blank.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false: the blank label is mandatory.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Iterate over all labels, blank first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl Index<usize> for Alphabet {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.labels[index]
    }
}
