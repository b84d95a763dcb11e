//! Global tempo estimation from inter-onset intervals.
//!
//! Onsets are reduced to inter-onset intervals, folded into the 0.2–2 s band
//! and clustered greedily; the largest cluster's mean gives the tempo.

use crate::parse::MidiScore;

/// Used when the estimate fails (too few usable onsets).
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

const MIN_IOI: f64 = 0.05;
const MAX_IOI: f64 = 2.0;
const FOLD_BELOW: f64 = 0.2;
const CLUSTER_WIDTH: f64 = 0.025;

/// Estimate the dominant tempo in BPM, or `None` when no usable intervals exist.
pub fn estimate_tempo(score: &MidiScore) -> Option<f64> {
    let mut onsets: Vec<f64> = score
        .instruments
        .iter()
        .flat_map(|i| i.notes.iter().map(|n| n.start))
        .collect();
    onsets.sort_by(f64::total_cmp);
    onsets.dedup();

    estimate_from_onsets(&onsets)
}

/// Tempo estimate with the 120 BPM fallback applied.
pub fn tempo_or_default(score: &MidiScore) -> f64 {
    estimate_tempo(score).unwrap_or(DEFAULT_TEMPO_BPM)
}

fn estimate_from_onsets(onsets: &[f64]) -> Option<f64> {
    let iois = onsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&ioi| ioi > MIN_IOI && ioi < MAX_IOI)
        .map(|mut ioi| {
            while ioi < FOLD_BELOW {
                ioi *= 2.0;
            }
            ioi
        });

    // (mean, count)
    let mut clusters: Vec<(f64, f64)> = Vec::new();
    for ioi in iois {
        if !clusters.iter().any(|&(mean, _)| (mean - ioi).abs() < CLUSTER_WIDTH) {
            clusters.push((ioi, 1.0));
            continue;
        }
        // A match updates the cluster with the smallest mean, which need not
        // be the one that matched
        let k = smallest_mean(&clusters);
        let (mean, count) = clusters[k];
        clusters[k] = ((count * mean + ioi) / (count + 1.0), count + 1.0);
    }

    // Later clusters win ties
    let mut best: Option<(f64, f64)> = None;
    for &(mean, count) in &clusters {
        if best.is_none_or(|(_, c)| count >= c) {
            best = Some((mean, count));
        }
    }
    best.map(|(mean, _)| 60.0 / mean)
}

/// Index of the smallest cluster mean, first on ties.
fn smallest_mean(clusters: &[(f64, f64)]) -> usize {
    let mut k = 0;
    for (i, &(mean, _)) in clusters.iter().enumerate() {
        if mean < clusters[k].0 {
            k = i;
        }
    }
    k
}
