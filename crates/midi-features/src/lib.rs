pub mod features;
pub mod note;
pub mod parse;
pub mod profile;
pub mod program_freq;
pub mod scaler;
pub mod summary;
pub mod tempo;
pub mod window;
pub mod writer;

pub use features::{
    raw_windows, window_rows, FeatureExtractor, FeatureName, FeatureRow, FeatureWindow, RawWindow, ACCENT_THRESHOLD,
    DEFAULT_CHUNK_SIZE, FEATURE_COUNT,
};
pub use note::{Instrument, Note, DRUM_CHANNEL};
pub use parse::{parse, parse_with, MidiScore, ParseOptions, TempoChange};
pub use profile::{file_profile, segment_profiles, Metric, ProfileRow};
pub use program_freq::ProgramFrequencies;
pub use scaler::StandardScaler;
pub use summary::{summarize_chunks, ChunkSummary};
pub use tempo::{estimate_tempo, tempo_or_default, DEFAULT_TEMPO_BPM};
pub use window::{segment, WindowStats};
pub use writer::{monophonic_midi, score_to_midi, WriterTrack};

use std::path::PathBuf;

/// Errors from MIDI parsing and feature artifacts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("invalid chunk size {0}, must be at least 1")]
    InvalidChunkSize(usize),

    #[error("segment count must be at least 1")]
    InvalidSegmentCount,

    #[error("invalid artifact {path}: {message}")]
    InvalidArtifact { path: PathBuf, message: String },

    #[error("feature width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
