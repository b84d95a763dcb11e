//! Chunk-level summary statistics for exploratory datasets.
//!
//! Unlike the classifier features these pool every instrument (drums
//! included) into one timeline before chunking.

use crate::note::Note;
use crate::parse::MidiScore;
use crate::tempo::tempo_or_default;
use crate::window::{mean, population_std, segment};
use serde::{Deserialize, Serialize};

/// Onsets closer than this to a group's first onset belong to the same chord.
const CHORD_ONSET_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub tempo: f64,
    pub num_instruments: usize,
    pub duration: f64,
    pub note_count: usize,
    pub avg_pitch: f64,
    pub pitch_range: u8,
    pub std_pitch: f64,
    pub most_common_pitch: u8,
    pub avg_duration: f64,
    pub std_duration: f64,
    pub note_density: f64,
    pub velocity_mean: f64,
    pub velocity_std: f64,
    pub avg_chord_size: f64,
    pub chord_density: f64,
}

impl ChunkSummary {
    pub fn compute(notes: &[Note], duration: f64, num_instruments: usize, tempo: f64) -> Self {
        let pitches: Vec<f64> = notes.iter().map(|n| n.pitch as f64).collect();
        let velocities: Vec<f64> = notes.iter().map(|n| n.velocity as f64).collect();
        let durations: Vec<f64> = notes.iter().map(Note::duration).collect();

        let pitch_range = match (
            notes.iter().map(|n| n.pitch).max(),
            notes.iter().map(|n| n.pitch).min(),
        ) {
            (Some(max), Some(min)) => max - min,
            _ => 0,
        };

        let chord_sizes = chord_sizes(notes);
        let sizes: Vec<f64> = chord_sizes.iter().map(|&s| s as f64).collect();

        let per_second = |count: usize| {
            if duration > 0.0 {
                count as f64 / duration
            } else {
                0.0
            }
        };

        Self {
            tempo,
            num_instruments,
            duration,
            note_count: notes.len(),
            avg_pitch: mean(&pitches),
            pitch_range,
            std_pitch: population_std(&pitches),
            most_common_pitch: most_common_pitch(notes),
            avg_duration: mean(&durations),
            std_duration: population_std(&durations),
            note_density: per_second(notes.len()),
            velocity_mean: mean(&velocities),
            velocity_std: population_std(&velocities),
            avg_chord_size: mean(&sizes),
            chord_density: per_second(chord_sizes.len()),
        }
    }
}

/// Summaries for every full chunk of the score's pooled notes. Scores with
/// fewer than `chunk_size` notes produce nothing.
pub fn summarize_chunks(score: &MidiScore, chunk_size: usize) -> crate::Result<Vec<ChunkSummary>> {
    let notes = score.all_notes_sorted();
    if notes.len() < chunk_size {
        return Ok(Vec::new());
    }

    let tempo = tempo_or_default(score);
    let num_instruments = score.instruments.len();

    Ok(segment(&notes, chunk_size)?
        .map(|chunk| {
            let duration = chunk[chunk.len() - 1].end - chunk[0].start;
            ChunkSummary::compute(chunk, duration, num_instruments, tempo)
        })
        .collect())
}

fn chord_sizes(notes: &[Note]) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut i = 0;
    while i < notes.len() {
        let anchor = notes[i].start;
        let mut j = i + 1;
        while j < notes.len() && (notes[j].start - anchor).abs() < CHORD_ONSET_TOLERANCE {
            j += 1;
        }
        sizes.push(j - i);
        i = j;
    }
    sizes
}

/// Most frequent pitch; among equals the one seen first wins.
fn most_common_pitch(notes: &[Note]) -> u8 {
    let mut counts = [0usize; 128];
    let mut first_seen = [usize::MAX; 128];
    for (i, note) in notes.iter().enumerate() {
        let p = (note.pitch & 0x7F) as usize;
        counts[p] += 1;
        first_seen[p] = first_seen[p].min(i);
    }
    (0..128usize)
        .filter(|&p| counts[p] > 0)
        .max_by(|&a, &b| counts[a].cmp(&counts[b]).then(first_seen[b].cmp(&first_seen[a])))
        .map(|p| p as u8)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use crate::writer::{score_to_midi, WriterTrack};

    #[test]
    fn chord_grouping_uses_first_onset() {
        let notes = vec![
            Note::new(60, 90, 0.0, 1.0),
            Note::new(64, 90, 0.03, 1.0),
            Note::new(67, 90, 0.06, 1.0), // 60 ms from anchor: new group
            Note::new(72, 90, 1.0, 2.0),
        ];
        assert_eq!(chord_sizes(&notes), vec![2, 1, 1]);
    }

    #[test]
    fn most_common_prefers_first_seen_on_ties() {
        let notes = vec![
            Note::new(64, 90, 0.0, 1.0),
            Note::new(60, 90, 1.0, 2.0),
            Note::new(60, 90, 2.0, 3.0),
            Note::new(64, 90, 3.0, 4.0),
        ];
        assert_eq!(most_common_pitch(&notes), 64);
    }

    #[test]
    fn summary_fields() {
        let notes = vec![
            Note::new(60, 100, 0.0, 1.0),
            Note::new(64, 60, 0.0, 1.0),
            Note::new(67, 80, 1.0, 3.0),
        ];
        let s = ChunkSummary::compute(&notes, 3.0, 2, 110.0);

        assert_eq!(s.note_count, 3);
        assert_eq!(s.pitch_range, 7);
        assert!((s.avg_pitch - 191.0 / 3.0).abs() < 1e-9);
        assert!((s.note_density - 1.0).abs() < 1e-9);
        assert!((s.velocity_mean - 80.0).abs() < 1e-9);
        assert!((s.avg_chord_size - 1.5).abs() < 1e-9);
        assert!((s.chord_density - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.num_instruments, 2);
        assert_eq!(s.tempo, 110.0);
    }

    #[test]
    fn zero_duration_has_zero_density() {
        let notes = vec![Note::new(60, 100, 1.0, 1.0)];
        let s = ChunkSummary::compute(&notes, 0.0, 1, 120.0);
        assert_eq!(s.note_density, 0.0);
        assert_eq!(s.chord_density, 0.0);
    }

    #[test]
    fn chunks_pool_all_instruments() {
        let mut piano = WriterTrack::new(0, 0);
        let mut drums = WriterTrack::new(9, 0);
        for i in 0..6u64 {
            piano.note(i * 480, i * 480 + 240, 60, 90);
            drums.note(i * 480 + 240, i * 480 + 300, 36, 120);
        }
        let score = parse(&score_to_midi(480, &[piano, drums])).unwrap();

        let chunks = summarize_chunks(&score, 5).unwrap();
        assert_eq!(chunks.len(), 2); // 12 notes, remainder of 2 dropped
        assert!(chunks.iter().all(|c| c.note_count == 5 && c.num_instruments == 2));

        assert!(summarize_chunks(&score, 13).unwrap().is_empty());
    }
}
