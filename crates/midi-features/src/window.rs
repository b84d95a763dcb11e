use crate::note::Note;
use serde::{Deserialize, Serialize};

/// Guards the density division against zero-length windows.
const DENSITY_EPSILON: f64 = 1e-6;

/// Split notes into consecutive, non-overlapping windows of exactly
/// `chunk_size` notes. A trailing remainder is dropped.
///
/// Returns an error for a zero chunk size.
pub fn segment(notes: &[Note], chunk_size: usize) -> crate::Result<std::slice::ChunksExact<'_, Note>> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize(chunk_size));
    }
    Ok(notes.chunks_exact(chunk_size))
}

/// Aggregate statistics of one window, broadcast to every note in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub pitch_range: f64,
    pub note_density: f64,
    pub repetition_rate: f64,
    pub avg_interval: f64,
    pub rhythmic_variety: f64,
    pub chord_density: f64,
}

impl WindowStats {
    pub fn compute(window: &[Note]) -> Self {
        if window.is_empty() {
            return Self {
                pitch_range: 0.0,
                note_density: 0.0,
                repetition_rate: 0.0,
                avg_interval: 0.0,
                rhythmic_variety: 0.0,
                chord_density: 0.0,
            };
        }

        let len = window.len() as f64;
        let first = window[0];
        let last = window[window.len() - 1];

        let pitch_max = window.iter().map(|n| n.pitch).max().unwrap_or(0);
        let pitch_min = window.iter().map(|n| n.pitch).min().unwrap_or(0);

        let elapsed = last.end - first.start;
        let note_density = len / (elapsed + DENSITY_EPSILON);

        let repeats = window.windows(2).filter(|w| w[0].pitch == w[1].pitch).count();

        let avg_interval = if window.len() > 1 {
            window
                .windows(2)
                .map(|w| w[1].pitch as f64 - w[0].pitch as f64)
                .sum::<f64>()
                / (len - 1.0)
        } else {
            0.0
        };

        let durations: Vec<f64> = window.iter().map(Note::duration).collect();
        let rhythmic_variety = population_std(&durations);

        let overlapping = window.windows(2).filter(|w| w[1].start < w[0].end).count();

        Self {
            pitch_range: (pitch_max - pitch_min) as f64,
            note_density,
            repetition_rate: repeats as f64 / len,
            avg_interval,
            rhythmic_variety,
            chord_density: overlapping as f64 / len,
        }
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
