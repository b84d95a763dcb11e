use crate::features::{FeatureName, FeatureRow, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column-wise standardization: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> crate::Result<Self> {
        let scaler = Self {
            feature_names: Some(FeatureName::names().into_iter().map(String::from).collect()),
            mean,
            scale,
        };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Leaves rows unchanged.
    pub fn identity() -> Self {
        Self {
            feature_names: None,
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }

    /// Fit column means and population standard deviations.
    /// Zero-variance columns get a scale of 1.
    pub fn fit<'a>(rows: impl IntoIterator<Item = &'a FeatureRow>) -> Self {
        let mut count = 0usize;
        let mut sum = [0.0f64; FEATURE_COUNT];
        let mut sum_sq = [0.0f64; FEATURE_COUNT];

        // Sums are shifted by the first row to limit cancellation
        let mut shift: Option<FeatureRow> = None;
        for row in rows {
            let k = *shift.get_or_insert(*row);
            for c in 0..FEATURE_COUNT {
                let d = row[c] - k[c];
                sum[c] += d;
                sum_sq[c] += d * d;
            }
            count += 1;
        }

        if count == 0 {
            return Self::identity();
        }

        let k = shift.unwrap_or([0.0; FEATURE_COUNT]);
        let n = count as f64;
        let mut mean = vec![0.0; FEATURE_COUNT];
        let mut scale = vec![1.0; FEATURE_COUNT];
        for c in 0..FEATURE_COUNT {
            let m = sum[c] / n;
            mean[c] = k[c] + m;
            let variance = (sum_sq[c] / n - m * m).max(0.0);
            let std = variance.sqrt();
            scale[c] = if std > 0.0 { std } else { 1.0 };
        }

        Self {
            feature_names: Some(FeatureName::names().into_iter().map(String::from).collect()),
            mean,
            scale,
        }
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let scaler: Self =
            serde_json::from_str(&contents).map_err(|e| crate::Error::InvalidArtifact {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        scaler.validate().map_err(|e| crate::Error::InvalidArtifact {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(scaler)
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| crate::Error::InvalidArtifact {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| crate::Error::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn validate(&self) -> crate::Result<()> {
        for width in [self.mean.len(), self.scale.len()] {
            if width != FEATURE_COUNT {
                return Err(crate::Error::WidthMismatch {
                    expected: FEATURE_COUNT,
                    actual: width,
                });
            }
        }
        if let Some(names) = &self.feature_names {
            let expected = FeatureName::names();
            if names.iter().map(String::as_str).ne(expected.iter().copied()) {
                return Err(crate::Error::InvalidArtifact {
                    path: Default::default(),
                    message: format!("feature names {:?} do not match {:?}", names, expected),
                });
            }
        }
        Ok(())
    }

    pub fn transform_row(&self, row: &FeatureRow) -> FeatureRow {
        let mut out = [0.0; FEATURE_COUNT];
        for c in 0..FEATURE_COUNT {
            let scale = if self.scale[c] == 0.0 { 1.0 } else { self.scale[c] };
            out[c] = (row[c] - self.mean[c]) / scale;
        }
        out
    }
}
