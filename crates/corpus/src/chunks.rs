//! Chunk summaries for a labelled corpus, one CSV row per chunk.

use crate::discover::{composer_of, load_score, midi_files};
use anyhow::{Context, Result};
use midi_features::{summarize_chunks, ChunkSummary};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub composer: String,
    pub filename: String,
    pub summary: ChunkSummary,
}

const SUMMARY_COLUMNS: [&str; 15] = [
    "tempo",
    "num_instruments",
    "duration",
    "note_count",
    "avg_pitch",
    "pitch_range",
    "std_pitch",
    "most_common_pitch",
    "avg_duration",
    "std_duration",
    "note_density",
    "velocity_mean",
    "velocity_std",
    "avg_chord_size",
    "chord_density",
];

impl ChunkRecord {
    fn to_record(&self) -> Vec<String> {
        let s = &self.summary;
        vec![
            self.composer.clone(),
            self.filename.clone(),
            s.tempo.to_string(),
            s.num_instruments.to_string(),
            s.duration.to_string(),
            s.note_count.to_string(),
            s.avg_pitch.to_string(),
            s.pitch_range.to_string(),
            s.std_pitch.to_string(),
            s.most_common_pitch.to_string(),
            s.avg_duration.to_string(),
            s.std_duration.to_string(),
            s.note_density.to_string(),
            s.velocity_mean.to_string(),
            s.velocity_std.to_string(),
            s.avg_chord_size.to_string(),
            s.chord_density.to_string(),
        ]
    }
}

/// Summaries of every full chunk in every MIDI file under `root`. Files
/// directly under the root, unreadable files and files shorter than one
/// chunk contribute nothing.
pub fn summarize_corpus(root: &Path, chunk_size: usize) -> Vec<ChunkRecord> {
    let mut records = Vec::new();
    for path in midi_files(root) {
        let Some(composer) = composer_of(root, &path) else {
            tracing::debug!("No composer folder for {}", path.display());
            continue;
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let summaries = load_score(&path).and_then(|score| {
            summarize_chunks(&score, chunk_size)
                .with_context(|| format!("Failed to summarize {}", path.display()))
        });
        match summaries {
            Ok(summaries) => records.extend(summaries.into_iter().map(|summary| ChunkRecord {
                composer: composer.clone(),
                filename: filename.clone(),
                summary,
            })),
            Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
        }
    }

    tracing::info!("Summarized {} chunks under {}", records.len(), root.display());
    records
}

pub fn write_chunks(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["composer", "filename"];
    header.extend(SUMMARY_COLUMNS);
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(record.to_record())?;
    }
    writer.flush()?;
    Ok(())
}
