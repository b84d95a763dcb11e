//! Composer classes, the classifier seam, and the attention-pooled checkpoint.
//!
//! The checkpoint is a JSON export of a small network:
//!
//! ```text
//! window (T × 14) ─► dense encoder per timestep (T × H)
//!                 ─► additive attention: e_t = tanh(h_t·w + b_t), a = softmax(e)
//!                 ─► context Σ a_t h_t (H)
//!                 ─► dense head … ─► softmax over classes
//! ```
//!
//! Kernels are stored `[input][output]`, the layout Keras uses.

use crate::PredictError;
use midi_features::{FeatureWindow, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// The closed set of composers the classifier distinguishes, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Composer {
    Bach,
    Beethoven,
    Chopin,
    Mozart,
}

impl Composer {
    pub const ALL: [Composer; 4] = [
        Self::Bach,
        Self::Beethoven,
        Self::Chopin,
        Self::Mozart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bach => "Bach",
            Self::Beethoven => "Beethoven",
            Self::Chopin => "Chopin",
            Self::Mozart => "Mozart",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(Composer::as_str).collect()
    }
}

impl std::fmt::Display for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Composer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown composer {:?}", s))
    }
}

/// Maps one normalized window to a probability vector over [`Composer::ALL`].
pub trait Classifier: Send + Sync {
    /// Number of timesteps the classifier expects per window.
    fn timesteps(&self) -> usize;

    fn predict(&self, window: &FeatureWindow) -> Result<Vec<f32>, PredictError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(&self, values: &mut [f32]) {
        match self {
            Self::Linear => {}
            Self::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Self::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Self::Softmax => softmax(values),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// `[input][output]`
    pub kernel: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

impl Dense {
    fn input_dim(&self) -> usize {
        self.kernel.len()
    }

    fn output_dim(&self) -> usize {
        self.bias.len()
    }

    fn check(&self, name: &str, input_dim: usize) -> Result<(), String> {
        if self.input_dim() != input_dim {
            return Err(format!(
                "{name}: kernel has {} input rows, expected {input_dim}",
                self.input_dim()
            ));
        }
        if let Some(row) = self.kernel.iter().position(|r| r.len() != self.output_dim()) {
            return Err(format!(
                "{name}: kernel row {row} has {} columns, bias has {}",
                self.kernel[row].len(),
                self.output_dim()
            ));
        }
        Ok(())
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out = self.bias.clone();
        for (x, row) in input.iter().zip(&self.kernel) {
            for (o, w) in out.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        self.activation.apply(&mut out);
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attention {
    /// One weight per encoder unit.
    pub weight: Vec<f32>,
    /// One bias per timestep.
    pub bias: Vec<f32>,
}

/// Serialized form of [`AttentionClassifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub classes: Vec<String>,
    pub encoder: Dense,
    pub attention: Attention,
    pub head: Vec<Dense>,
}

/// Attention-pooled dense network loaded from a JSON [`Checkpoint`].
#[derive(Debug, Clone)]
pub struct AttentionClassifier {
    checkpoint: Checkpoint,
}

impl AttentionClassifier {
    pub fn load(path: &Path) -> Result<Self, PredictError> {
        let invalid = |message: String| PredictError::Checkpoint {
            path: path.to_path_buf(),
            message,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        Self::from_checkpoint(checkpoint).map_err(invalid)
    }

    /// Validate every shape up front so inference cannot index out of bounds.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self, String> {
        let labels = Composer::labels();
        if checkpoint.classes.iter().map(String::as_str).ne(labels.iter().copied()) {
            return Err(format!(
                "classes {:?} do not match {:?}",
                checkpoint.classes, labels
            ));
        }

        checkpoint.encoder.check("encoder", FEATURE_COUNT)?;
        let hidden = checkpoint.encoder.output_dim();

        if checkpoint.attention.weight.len() != hidden {
            return Err(format!(
                "attention weight has {} entries, encoder has {hidden} units",
                checkpoint.attention.weight.len()
            ));
        }
        if checkpoint.attention.bias.is_empty() {
            return Err("attention bias is empty".to_string());
        }

        let mut width = hidden;
        for (i, layer) in checkpoint.head.iter().enumerate() {
            layer.check(&format!("head[{i}]"), width)?;
            width = layer.output_dim();
        }
        match checkpoint.head.last() {
            Some(last) if last.activation == Activation::Softmax => {}
            _ => return Err("head must end in a softmax layer".to_string()),
        }
        if width != labels.len() {
            return Err(format!(
                "head outputs {width} values for {} classes",
                labels.len()
            ));
        }

        Ok(Self { checkpoint })
    }

    fn pool(&self, encoded: &[Vec<f32>]) -> Vec<f32> {
        let attention = &self.checkpoint.attention;
        let mut scores: Vec<f32> = encoded
            .iter()
            .zip(&attention.bias)
            .map(|(h, b)| {
                let dot: f32 = h.iter().zip(&attention.weight).map(|(x, w)| x * w).sum();
                (dot + b).tanh()
            })
            .collect();
        softmax(&mut scores);

        let mut context = vec![0.0f32; attention.weight.len()];
        for (h, a) in encoded.iter().zip(&scores) {
            for (c, x) in context.iter_mut().zip(h) {
                *c += a * x;
            }
        }
        context
    }
}

impl Classifier for AttentionClassifier {
    fn timesteps(&self) -> usize {
        self.checkpoint.attention.bias.len()
    }

    fn predict(&self, window: &FeatureWindow) -> Result<Vec<f32>, PredictError> {
        if window.matrix.len() != self.timesteps() {
            return Err(PredictError::Shape(format!(
                "window has {} rows, classifier expects {}",
                window.matrix.len(),
                self.timesteps()
            )));
        }

        let encoded: Vec<Vec<f32>> = window
            .matrix
            .iter()
            .map(|row| self.checkpoint.encoder.forward(row))
            .collect();

        let mut x = self.pool(&encoded);
        for layer in &self.checkpoint.head {
            x = layer.forward(&x);
        }
        Ok(x)
    }
}

pub(crate) fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A checkpoint whose encoder copies `Pitch` into one unit and whose head
    /// favours Chopin for high pitches.
    pub(crate) fn pitch_checkpoint(timesteps: usize) -> Checkpoint {
        let mut kernel = vec![vec![0.0f32; 2]; FEATURE_COUNT];
        kernel[0][0] = 1.0;
        Checkpoint {
            classes: Composer::labels().into_iter().map(String::from).collect(),
            encoder: Dense {
                kernel,
                bias: vec![0.0, 1.0],
                activation: Activation::Linear,
            },
            attention: Attention {
                weight: vec![0.0, 0.0],
                bias: vec![0.0; timesteps],
            },
            head: vec![Dense {
                kernel: vec![vec![0.0, 0.0, 1.0, 0.0], vec![0.0; 4]],
                bias: vec![0.0; 4],
                activation: Activation::Softmax,
            }],
        }
    }

    fn window(rows: usize, pitch: f32) -> FeatureWindow {
        let mut row = [0.0f32; FEATURE_COUNT];
        row[0] = pitch;
        FeatureWindow {
            program: 0,
            matrix: vec![row; rows],
        }
    }

    #[test]
    fn composer_order_is_fixed() {
        assert_eq!(Composer::labels(), vec!["Bach", "Beethoven", "Chopin", "Mozart"]);
        assert_eq!(Composer::Chopin.index(), 2);
        assert_eq!("mozart".parse::<Composer>().unwrap(), Composer::Mozart);
        assert!("Liszt".parse::<Composer>().is_err());
    }

    #[test]
    fn softmax_sums_to_one() {
        let mut v = vec![1.0f32, 2.0, 3.0];
        softmax(&mut v);
        assert!((v.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(v[2] > v[1] && v[1] > v[0]);
    }

    #[test]
    fn uniform_attention_averages_timesteps() {
        let classifier = AttentionClassifier::from_checkpoint(pitch_checkpoint(4)).unwrap();
        let encoded = vec![vec![1.0, 0.0], vec![3.0, 0.0], vec![5.0, 0.0], vec![7.0, 0.0]];
        let context = classifier.pool(&encoded);
        assert!((context[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn prediction_is_a_distribution() {
        let classifier = AttentionClassifier::from_checkpoint(pitch_checkpoint(8)).unwrap();
        let probs = classifier.predict(&window(8, 3.0)).unwrap();

        assert_eq!(probs.len(), 4);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        let best = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(best, Some(Composer::Chopin.index()));
    }

    #[test]
    fn wrong_window_length_is_rejected() {
        let classifier = AttentionClassifier::from_checkpoint(pitch_checkpoint(8)).unwrap();
        assert!(matches!(
            classifier.predict(&window(7, 0.0)),
            Err(PredictError::Shape(_))
        ));
    }

    #[test]
    fn shape_errors_surface_at_load() {
        let mut bad = pitch_checkpoint(8);
        bad.encoder.kernel.pop();
        assert!(AttentionClassifier::from_checkpoint(bad).is_err());

        let mut bad = pitch_checkpoint(8);
        bad.classes.swap(0, 1);
        assert!(AttentionClassifier::from_checkpoint(bad).is_err());

        let mut bad = pitch_checkpoint(8);
        bad.head[0].activation = Activation::Linear;
        assert!(AttentionClassifier::from_checkpoint(bad).is_err());
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("classifier.json");
        std::fs::write(&path, serde_json::to_string(&pitch_checkpoint(4)).unwrap()).unwrap();
        assert_eq!(AttentionClassifier::load(&path).unwrap().timesteps(), 4);

        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            AttentionClassifier::load(&path),
            Err(PredictError::Checkpoint { .. })
        ));
    }
}
