//! Per-composer metric CSVs, one row per file or per file segment.

use crate::discover::{load_score, midi_files};
use anyhow::{Context, Result};
use midi_features::{file_profile, segment_profiles, Metric, ProfileRow};
use std::path::{Path, PathBuf};

/// Profile rows for every MIDI file under `dir`, tagged with the file name.
/// `num_segments` switches from whole-file rows to segment rows.
pub fn profile_dir(
    dir: &Path,
    metrics: &[Metric],
    num_segments: Option<usize>,
) -> Vec<(String, ProfileRow)> {
    let mut out = Vec::new();
    for path in midi_files(dir) {
        let name = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        let score = match load_score(&path) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };

        match num_segments {
            None => out.push((name, file_profile(&score, metrics))),
            Some(n) => match segment_profiles(&score, metrics, n) {
                Ok(rows) => out.extend(rows.into_iter().map(|row| (name.clone(), row))),
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            },
        }
    }
    out
}

pub fn write_profiles(path: &Path, metrics: &[Metric], rows: &[(String, ProfileRow)]) -> Result<()> {
    let segmented = rows.iter().any(|(_, row)| row.segment.is_some());

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["filename".to_string()];
    if segmented {
        header.push("segment".to_string());
    }
    header.extend(metrics.iter().map(|m| m.as_str().to_string()));
    writer.write_record(&header)?;

    for (name, row) in rows {
        let mut record = vec![name.clone()];
        if segmented {
            record.push(row.segment.map(|s| s.to_string()).unwrap_or_default());
        }
        record.extend(
            metrics
                .iter()
                .map(|m| row.get(*m).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn per_composer(
    input_dir: &Path,
    output_dir: &Path,
    composers: &[String],
    metrics: &[Metric],
    num_segments: Option<usize>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut written = Vec::new();
    for composer in composers {
        let dir = input_dir.join(composer);
        if !dir.is_dir() {
            tracing::warn!("No folder for {} under {}", composer, input_dir.display());
            continue;
        }

        let rows = profile_dir(&dir, metrics, num_segments);
        let path = output_dir.join(format!("{}.csv", composer));
        match write_profiles(&path, metrics, &rows) {
            Ok(()) => {
                tracing::info!("{}: {} rows to {}", composer, rows.len(), path.display());
                written.push(path);
            }
            Err(e) => tracing::warn!("Failed to write features for {}: {:#}", composer, e),
        }
    }
    Ok(written)
}

/// One `<composer>.csv` of whole-file profiles per composer folder.
pub fn extract_composers(
    input_dir: &Path,
    output_dir: &Path,
    composers: &[String],
    metrics: &[Metric],
) -> Result<Vec<PathBuf>> {
    per_composer(input_dir, output_dir, composers, metrics, None)
}

/// One `<composer>.csv` of segment profiles per composer folder.
pub fn segment_composers(
    input_dir: &Path,
    output_dir: &Path,
    composers: &[String],
    metrics: &[Metric],
    num_segments: usize,
) -> Result<Vec<PathBuf>> {
    per_composer(input_dir, output_dir, composers, metrics, Some(num_segments))
}
