//! Finding and loading MIDI files under a corpus root.

use anyhow::{Context, Result};
use midi_features::{parse, parse_with, MidiScore, ParseOptions};
use std::path::{Path, PathBuf};

const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];
const ARCHIVE_EXTENSIONS: [&str; 1] = ["zip"];

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| candidates.iter().any(|c| ext.eq_ignore_ascii_case(c)))
}

pub fn is_midi(path: &Path) -> bool {
    has_extension(path, &MIDI_EXTENSIONS)
}

pub fn is_archive(path: &Path) -> bool {
    has_extension(path, &ARCHIVE_EXTENSIONS)
}

/// Every MIDI file below `root`, sorted by path. Unreadable entries are skipped.
pub fn midi_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_midi(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// First path component below `root`, the composer label of a labelled corpus.
pub fn composer_of(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    // A file directly under the root has no composer folder
    components.next()?;
    Some(first.as_os_str().to_string_lossy().into_owned())
}

/// Read and parse a MIDI file.
///
/// Files carrying tempo or signature events outside the first track are
/// parsed again with those events ignored.
pub fn load_score(path: &Path) -> Result<MidiScore> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let score = parse(&bytes).with_context(|| format!("Failed to parse {}", path.display()))?;
    if !score.nonzero_track_meta {
        return Ok(score);
    }

    tracing::debug!(
        "Meta events outside the first track in {}, using first-track tempo only",
        path.display()
    );
    parse_with(
        &bytes,
        ParseOptions {
            first_track_tempo_only: true,
        },
    )
    .with_context(|| format!("Failed to parse {}", path.display()))
}
