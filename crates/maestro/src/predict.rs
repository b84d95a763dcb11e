use crate::model::{AttentionClassifier, Classifier, Composer};
use crate::{PredictError, Result};
use maestroconf::MaestroConfig;
use midi_features::{FeatureExtractor, ProgramFrequencies, StandardScaler};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedClass {
    pub index: usize,
    pub label: &'static str,
    pub prob: f64,
}

/// Body of a successful `/predict` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub top: Vec<RankedClass>,
    pub classes: Vec<&'static str>,
    pub probs: Vec<f64>,
    pub chunks: usize,
    pub aggregation: &'static str,
    pub audio_data_url: Option<String>,
}

/// Arithmetic mean of per-window distributions, renormalized to sum to one.
pub fn aggregate_mean(per_window: &[Vec<f32>], num_classes: usize) -> Result<Vec<f64>> {
    let mut sum = vec![0.0f64; num_classes];
    for probs in per_window {
        if probs.len() != num_classes {
            return Err(PredictError::ClassCount {
                expected: num_classes,
                actual: probs.len(),
            });
        }
        for (s, p) in sum.iter_mut().zip(probs) {
            *s += *p as f64;
        }
    }

    let n = per_window.len().max(1) as f64;
    let mut mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();
    let total: f64 = mean.iter().sum();
    if total > 0.0 {
        mean.iter_mut().for_each(|p| *p /= total);
    } else if num_classes > 0 {
        mean.iter_mut().for_each(|p| *p = 1.0 / num_classes as f64);
    }
    Ok(mean)
}

/// Class indices by descending probability, lower index first on ties,
/// truncated to `k` clamped into `[1, probs.len()]`.
pub fn rank_top_k(probs: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    order.truncate(k.clamp(1, probs.len().max(1)));
    order
}

/// Interpret the raw `top_k` form value. Missing or non-integer values fall
/// back to `default`; the result is clamped into `[1, num_classes]`.
pub fn resolve_top_k(raw: Option<&str>, default: usize, num_classes: usize) -> usize {
    let requested = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(default as i64);
    requested.clamp(1, num_classes.max(1) as i64) as usize
}

/// Feature extractor and classifier, loaded once and shared read-only.
pub struct Predictor {
    extractor: FeatureExtractor,
    classifier: Arc<dyn Classifier>,
}

impl Predictor {
    pub fn new(extractor: FeatureExtractor, classifier: Arc<dyn Classifier>) -> Result<Self> {
        if classifier.timesteps() != extractor.chunk_size() {
            return Err(PredictError::Shape(format!(
                "classifier expects {} timesteps but chunk_size is {}",
                classifier.timesteps(),
                extractor.chunk_size()
            )));
        }
        Ok(Self {
            extractor,
            classifier,
        })
    }

    /// Load scaler, program-frequency table and checkpoint from configured paths.
    pub fn load(config: &MaestroConfig) -> Result<Self> {
        let paths = &config.paths;

        let scaler = StandardScaler::load(&paths.scaler)?;
        info!("   Scaler: {}", paths.scaler.display());

        let program_freq = ProgramFrequencies::load(&paths.program_freq)?;
        info!(
            "   Program frequencies: {} ({} programs)",
            paths.program_freq.display(),
            program_freq.len()
        );

        let classifier = AttentionClassifier::load(&paths.checkpoint)?;
        info!("   Checkpoint: {}", paths.checkpoint.display());

        let extractor = FeatureExtractor::new(config.features.chunk_size, scaler, program_freq)?;
        Self::new(extractor, Arc::new(classifier))
    }

    pub fn chunk_size(&self) -> usize {
        self.extractor.chunk_size()
    }

    /// [`Predictor::predict_bytes`] on a file read from disk.
    pub fn predict_file(&self, path: &Path, top_k: usize) -> Result<Prediction> {
        let midi = std::fs::read(path)?;
        self.predict_bytes(&midi, top_k)
    }

    /// Parse, window, classify and aggregate one MIDI file.
    pub fn predict_bytes(&self, midi: &[u8], top_k: usize) -> Result<Prediction> {
        let score = midi_features::parse(midi)?;
        let windows = self.extractor.extract(&score)?;
        if windows.is_empty() {
            return Err(PredictError::NoWindows {
                chunk_size: self.chunk_size(),
            });
        }
        debug!(
            notes = score.note_count(),
            windows = windows.len(),
            "extracted feature windows"
        );

        let per_window = windows
            .iter()
            .map(|w| self.classifier.predict(w))
            .collect::<Result<Vec<_>>>()?;

        let probs = aggregate_mean(&per_window, Composer::ALL.len())?;
        let top = rank_top_k(&probs, top_k)
            .into_iter()
            .map(|index| RankedClass {
                index,
                label: Composer::ALL[index].as_str(),
                prob: probs[index],
            })
            .collect();

        Ok(Prediction {
            top,
            classes: Composer::labels(),
            probs,
            chunks: windows.len(),
            aggregation: "mean",
            audio_data_url: None,
        })
    }
}
