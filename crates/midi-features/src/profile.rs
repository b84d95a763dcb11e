//! Whole-file and time-segment metric profiles for composer-level tables.

use crate::note::Note;
use crate::parse::MidiScore;
use crate::window::mean;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalCounts,
    AvgVelocity,
    AvgPitch,
    PitchRange,
    AvgDuration,
    NoteDensity,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Self::TotalCounts,
        Self::AvgVelocity,
        Self::AvgPitch,
        Self::PitchRange,
        Self::AvgDuration,
        Self::NoteDensity,
    ];

    pub const DEFAULT: [Metric; 2] = [Self::TotalCounts, Self::AvgVelocity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalCounts => "total_counts",
            Self::AvgVelocity => "avg_velocity",
            Self::AvgPitch => "avg_pitch",
            Self::PitchRange => "pitch_range",
            Self::AvgDuration => "avg_duration",
            Self::NoteDensity => "note_density",
        }
    }

    fn measure(&self, notes: &[Note], span: f64) -> f64 {
        match self {
            Self::TotalCounts => notes.len() as f64,
            Self::AvgVelocity => {
                mean(&notes.iter().map(|n| n.velocity as f64).collect::<Vec<_>>())
            }
            Self::AvgPitch => mean(&notes.iter().map(|n| n.pitch as f64).collect::<Vec<_>>()),
            Self::PitchRange => match (
                notes.iter().map(|n| n.pitch).max(),
                notes.iter().map(|n| n.pitch).min(),
            ) {
                (Some(max), Some(min)) => (max - min) as f64,
                _ => 0.0,
            },
            Self::AvgDuration => mean(&notes.iter().map(Note::duration).collect::<Vec<_>>()),
            Self::NoteDensity => {
                if span > 0.0 {
                    notes.len() as f64 / span
                } else {
                    0.0
                }
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| format!("unknown metric {:?}", s))
    }
}

/// Metric values for a whole file (`segment == None`) or one time segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub segment: Option<usize>,
    pub values: Vec<(Metric, f64)>,
}

impl ProfileRow {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.iter().find(|(m, _)| *m == metric).map(|(_, v)| *v)
    }
}

pub fn file_profile(score: &MidiScore, metrics: &[Metric]) -> ProfileRow {
    let notes = score.all_notes_sorted();
    let span = score.end_time();
    ProfileRow {
        segment: None,
        values: metrics.iter().map(|m| (*m, m.measure(&notes, span))).collect(),
    }
}

/// Split the file's time span into `num_segments` equal parts and profile
/// each; a note belongs to the segment containing its onset.
pub fn segment_profiles(
    score: &MidiScore,
    metrics: &[Metric],
    num_segments: usize,
) -> crate::Result<Vec<ProfileRow>> {
    if num_segments == 0 {
        return Err(crate::Error::InvalidSegmentCount);
    }

    let end = score.end_time();
    let width = end / num_segments as f64;

    let mut buckets: Vec<Vec<Note>> = vec![Vec::new(); num_segments];
    for note in score.all_notes_sorted() {
        let idx = if width > 0.0 {
            ((note.start / width).floor() as usize).min(num_segments - 1)
        } else {
            0
        };
        buckets[idx].push(note);
    }

    Ok(buckets
        .iter()
        .enumerate()
        .map(|(i, notes)| ProfileRow {
            segment: Some(i),
            values: metrics.iter().map(|m| (*m, m.measure(notes, width))).collect(),
        })
        .collect())
}
