//! Per-note feature assembly for the sequence classifier.
//!
//! Each pitched instrument is segmented into windows; every note in a window
//! becomes one [`FeatureRow`] combining its own fields with the window's
//! [`WindowStats`], the global tempo estimate and the frequency-encoded
//! program. [`FeatureExtractor`] adds the standardization step.

use crate::note::Note;
use crate::parse::MidiScore;
use crate::program_freq::ProgramFrequencies;
use crate::scaler::StandardScaler;
use crate::tempo::tempo_or_default;
use crate::window::{segment, WindowStats};
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 14;

/// Velocities strictly above this are accented.
pub const ACCENT_THRESHOLD: u8 = 80;

pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// One note's features, in [`FeatureName::ALL`] order.
pub type FeatureRow = [f64; FEATURE_COUNT];

/// Feature columns in the order the scaler and classifier expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureName {
    Pitch,
    Duration,
    Velocity,
    DeltaTime,
    Interval,
    #[serde(rename = "Program_FE")]
    ProgramFe,
    Accented,
    Tempo,
    PitchRange,
    NoteDensity,
    RepetitionRate,
    AvgInterval,
    RhythmicVariety,
    ChordDensity,
}

impl FeatureName {
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        Self::Pitch,
        Self::Duration,
        Self::Velocity,
        Self::DeltaTime,
        Self::Interval,
        Self::ProgramFe,
        Self::Accented,
        Self::Tempo,
        Self::PitchRange,
        Self::NoteDensity,
        Self::RepetitionRate,
        Self::AvgInterval,
        Self::RhythmicVariety,
        Self::ChordDensity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pitch => "Pitch",
            Self::Duration => "Duration",
            Self::Velocity => "Velocity",
            Self::DeltaTime => "DeltaTime",
            Self::Interval => "Interval",
            Self::ProgramFe => "Program_FE",
            Self::Accented => "Accented",
            Self::Tempo => "Tempo",
            Self::PitchRange => "PitchRange",
            Self::NoteDensity => "NoteDensity",
            Self::RepetitionRate => "RepetitionRate",
            Self::AvgInterval => "AvgInterval",
            Self::RhythmicVariety => "RhythmicVariety",
            Self::ChordDensity => "ChordDensity",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(FeatureName::as_str).collect()
    }
}

impl std::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A window of unscaled rows. The `Program_FE` column is left at zero until
/// [`RawWindow::encode_program`] fills it from a frequency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWindow {
    pub program: u8,
    pub instrument_index: usize,
    pub window_index: usize,
    pub rows: Vec<FeatureRow>,
}

impl RawWindow {
    pub fn encode_program(&mut self, program_freq: &ProgramFrequencies) {
        let fe = program_freq.encode(self.program);
        for row in &mut self.rows {
            row[FeatureName::ProgramFe.index()] = fe;
        }
    }
}

/// A normalized `chunk_size × FEATURE_COUNT` matrix ready for inference.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    pub program: u8,
    pub matrix: Vec<[f32; FEATURE_COUNT]>,
}

/// Assemble the rows of one window.
pub fn window_rows(window: &[Note], tempo_bpm: f64) -> Vec<FeatureRow> {
    let stats = WindowStats::compute(window);
    let Some(first) = window.first() else {
        return Vec::new();
    };

    let mut prev_start = first.start;
    let mut prev_pitch = first.pitch;

    window
        .iter()
        .map(|note| {
            let mut row = [0.0; FEATURE_COUNT];
            row[FeatureName::Pitch.index()] = note.pitch as f64;
            row[FeatureName::Duration.index()] = note.duration();
            row[FeatureName::Velocity.index()] = note.velocity as f64;
            row[FeatureName::DeltaTime.index()] = note.start - prev_start;
            row[FeatureName::Interval.index()] = note.pitch as f64 - prev_pitch as f64;
            row[FeatureName::Accented.index()] = if note.velocity > ACCENT_THRESHOLD {
                1.0
            } else {
                0.0
            };
            row[FeatureName::Tempo.index()] = tempo_bpm;
            row[FeatureName::PitchRange.index()] = stats.pitch_range;
            row[FeatureName::NoteDensity.index()] = stats.note_density;
            row[FeatureName::RepetitionRate.index()] = stats.repetition_rate;
            row[FeatureName::AvgInterval.index()] = stats.avg_interval;
            row[FeatureName::RhythmicVariety.index()] = stats.rhythmic_variety;
            row[FeatureName::ChordDensity.index()] = stats.chord_density;

            prev_start = note.start;
            prev_pitch = note.pitch;
            row
        })
        .collect()
}

/// Every full window of every pitched instrument, unscaled.
pub fn raw_windows(score: &MidiScore, chunk_size: usize) -> crate::Result<Vec<RawWindow>> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize(chunk_size));
    }
    let tempo = tempo_or_default(score);

    let mut windows = Vec::new();
    for (instrument_index, instrument) in score.instruments.iter().enumerate() {
        if instrument.is_drum || instrument.notes.len() < chunk_size {
            continue;
        }
        let notes = instrument.sorted_notes();
        for (window_index, window) in segment(&notes, chunk_size)?.enumerate() {
            windows.push(RawWindow {
                program: instrument.program,
                instrument_index,
                window_index,
                rows: window_rows(window, tempo),
            });
        }
    }
    Ok(windows)
}

/// Turns parsed scores into normalized feature windows using fitted artifacts.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    chunk_size: usize,
    scaler: StandardScaler,
    program_freq: ProgramFrequencies,
}

impl FeatureExtractor {
    pub fn new(
        chunk_size: usize,
        scaler: StandardScaler,
        program_freq: ProgramFrequencies,
    ) -> crate::Result<Self> {
        if chunk_size == 0 {
            return Err(crate::Error::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            chunk_size,
            scaler,
            program_freq,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn program_freq(&self) -> &ProgramFrequencies {
        &self.program_freq
    }

    /// Normalized windows for every full chunk in the score. Empty when no
    /// pitched instrument has at least `chunk_size` notes.
    pub fn extract(&self, score: &MidiScore) -> crate::Result<Vec<FeatureWindow>> {
        let mut raw = raw_windows(score, self.chunk_size)?;
        Ok(raw
            .iter_mut()
            .map(|window| {
                window.encode_program(&self.program_freq);
                FeatureWindow {
                    program: window.program,
                    matrix: window
                        .rows
                        .iter()
                        .map(|row| self.scaler.transform_row(row).map(|v| v as f32))
                        .collect(),
                }
            })
            .collect())
    }
}
