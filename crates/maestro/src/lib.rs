//! Composer prediction service.
//!
//! Uploaded MIDI files are parsed with `midi-features`, windowed and scaled,
//! classified window by window, and the per-window distributions are averaged
//! into one ranked prediction.

pub mod model;
pub mod predict;
pub mod preview;
pub mod telemetry;
pub mod upload;
pub mod web;

pub use model::{AttentionClassifier, Classifier, Composer};
pub use predict::{aggregate_mean, rank_top_k, resolve_top_k, Prediction, Predictor, RankedClass};
pub use preview::Previewer;
pub use web::{router, WebState};

use std::path::PathBuf;

/// Errors from loading the model bundle or predicting on an upload.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Features(#[from] midi_features::Error),

    #[error("File has fewer than {chunk_size} usable notes after filtering")]
    NoWindows { chunk_size: usize },

    #[error("invalid checkpoint {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("classifier returned {actual} probabilities, expected {expected}")]
    ClassCount { expected: usize, actual: usize },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PredictError {
    /// Problems with the uploaded file itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoWindows { .. } | Self::Features(midi_features::Error::MidiParse(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;
