//! Non-fatal conditions raised while recognizing a batch.

use std::fmt;
use std::sync::Mutex;

use tracing::warn;

/// A recoverable condition. Diagnostics never abort a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// `run_batch` was called with no quadrilaterals.
    EmptyBatch,
    /// The decoder picked a class the alphabet has no label for.
    IndexOutOfRange {
        timestep: usize,
        index: usize,
        alphabet_len: usize,
    },
    /// The model emits more classes than the alphabet holds.
    ClassCountMismatch {
        class_count: usize,
        alphabet_len: usize,
    },
    /// Rectification produced an empty crop.
    DegenerateQuad { index: usize },
    /// One item failed; its slot holds the error.
    ItemFailed { index: usize, reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::EmptyBatch => write!(f, "no quadrilaterals provided, skipping recognition"),
            Diagnostic::IndexOutOfRange {
                timestep,
                index,
                alphabet_len,
            } => write!(
                f,
                "argmax index {} at timestep {} out of range (alphabet size {})",
                index, timestep, alphabet_len
            ),
            Diagnostic::ClassCountMismatch {
                class_count,
                alphabet_len,
            } => write!(
                f,
                "model emits {} classes but alphabet has {} labels",
                class_count, alphabet_len
            ),
            Diagnostic::DegenerateQuad { index } => {
                write!(f, "quadrilateral #{} produced an empty crop", index)
            }
            Diagnostic::ItemFailed { index, reason } => {
                write!(f, "recognition of quadrilateral #{} failed: {}", index, reason)
            }
        }
    }
}

/// Receiver for diagnostics, kept separate from return values.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs every diagnostic as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
    }
}

/// Stores diagnostics for later inspection.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the collected diagnostics.
    pub fn take(&self) -> Vec<Diagnostic> {
        match self.diagnostics.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.diagnostics.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
