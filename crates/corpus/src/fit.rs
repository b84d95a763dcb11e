//! Training-set assembly: raw windows for a labelled corpus, then the
//! program-frequency table and scaler the service loads at startup.

use crate::discover::{composer_of, load_score, midi_files};
use anyhow::{Context, Result};
use midi_features::{raw_windows, FeatureName, ProgramFrequencies, RawWindow, StandardScaler};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One window of one file, with its composer label.
#[derive(Debug, Clone)]
pub struct LabelledWindow {
    pub composer: String,
    pub filename: String,
    pub window: RawWindow,
}

#[derive(Debug, Clone)]
pub struct FittedCorpus {
    pub windows: Vec<LabelledWindow>,
    pub program_freq: ProgramFrequencies,
    pub scaler: StandardScaler,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub files: usize,
    pub windows: usize,
    pub rows: usize,
    pub programs: usize,
    pub windows_per_composer: BTreeMap<String, usize>,
}

/// Build raw windows for every MIDI file below `root` (labelled by the first
/// folder under it), then fit the program table over every row and the scaler
/// over the program-encoded rows. When `composers` is non-empty, other folders
/// are ignored.
pub fn fit_corpus(root: &Path, chunk_size: usize, composers: &[String]) -> Result<FittedCorpus> {
    if chunk_size == 0 {
        anyhow::bail!("chunk size must be at least 1");
    }

    let mut windows = Vec::new();
    for path in midi_files(root) {
        let Some(composer) = composer_of(root, &path) else {
            continue;
        };
        if !composers.is_empty() && !composers.contains(&composer) {
            continue;
        }
        let filename = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        let raw = load_score(&path).and_then(|score| {
            raw_windows(&score, chunk_size)
                .with_context(|| format!("Failed to window {}", path.display()))
        });
        match raw {
            Ok(raw) => {
                tracing::debug!("{}: {} windows", filename, raw.len());
                windows.extend(raw.into_iter().map(|window| LabelledWindow {
                    composer: composer.clone(),
                    filename: filename.clone(),
                    window,
                }));
            }
            Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
        }
    }

    let program_freq = ProgramFrequencies::fit(
        windows
            .iter()
            .flat_map(|w| std::iter::repeat(w.window.program).take(w.window.rows.len())),
    );
    for labelled in &mut windows {
        labelled.window.encode_program(&program_freq);
    }
    let scaler = StandardScaler::fit(windows.iter().flat_map(|w| w.window.rows.iter()));

    Ok(FittedCorpus {
        windows,
        program_freq,
        scaler,
    })
}

impl FittedCorpus {
    pub fn summary(&self) -> FitSummary {
        let mut windows_per_composer = BTreeMap::new();
        for w in &self.windows {
            *windows_per_composer.entry(w.composer.clone()).or_insert(0) += 1;
        }
        let mut files: Vec<&str> = self.windows.iter().map(|w| w.filename.as_str()).collect();
        files.sort_unstable();
        files.dedup();

        FitSummary {
            files: files.len(),
            windows: self.windows.len(),
            rows: self.windows.iter().map(|w| w.window.rows.len()).sum(),
            programs: self.program_freq.len(),
            windows_per_composer,
        }
    }

    pub fn save_artifacts(&self, scaler_path: &Path, program_freq_path: &Path) -> Result<()> {
        for path in [scaler_path, program_freq_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        self.scaler.save(scaler_path)?;
        self.program_freq.save(program_freq_path)?;
        tracing::info!(
            "Wrote {} and {}",
            scaler_path.display(),
            program_freq_path.display()
        );
        Ok(())
    }

    /// Scaled rows as CSV: label columns, window position, then one column per feature.
    pub fn write_rows(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut header = vec!["composer", "filename", "instrument", "window", "position"];
        header.extend(FeatureName::names());
        writer.write_record(&header)?;

        for labelled in &self.windows {
            for (position, row) in labelled.window.rows.iter().enumerate() {
                let mut record = vec![
                    labelled.composer.clone(),
                    labelled.filename.clone(),
                    labelled.window.instrument_index.to_string(),
                    labelled.window.window_index.to_string(),
                    position.to_string(),
                ];
                record.extend(self.scaler.transform_row(row).iter().map(|v| v.to_string()));
                writer.write_record(&record)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
