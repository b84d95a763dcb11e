//! Pipeline configuration: feature extraction, prediction, batch preprocessing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Notes per window. Must match the classifier's input length.
    /// Default: 200
    #[serde(default = "FeaturesConfig::default_chunk_size")]
    pub chunk_size: usize,
}

impl FeaturesConfig {
    fn default_chunk_size() -> usize {
        200
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    /// Used when a request omits `top_k` or sends a non-integer.
    /// Default: 3
    #[serde(default = "PredictConfig::default_top_k")]
    pub default_top_k: usize,

    /// Request body limit for uploads.
    /// Default: 10 MiB
    #[serde(default = "PredictConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Sample rate of rendered previews.
    /// Default: 44100
    #[serde(default = "PredictConfig::default_preview_sample_rate")]
    pub preview_sample_rate: u32,
}

impl PredictConfig {
    fn default_top_k() -> usize {
        3
    }

    fn default_max_upload_bytes() -> usize {
        10 * 1024 * 1024
    }

    fn default_preview_sample_rate() -> u32 {
        44_100
    }
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            default_top_k: Self::default_top_k(),
            max_upload_bytes: Self::default_max_upload_bytes(),
            preview_sample_rate: Self::default_preview_sample_rate(),
        }
    }
}

/// Directory layout and selection for the `corpus` commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Raw corpus, one folder per composer.
    #[serde(default = "CorpusConfig::default_input_dir")]
    pub input_dir: PathBuf,

    /// Selected composers are copied here.
    #[serde(default = "CorpusConfig::default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "CorpusConfig::default_extracted_features_dir")]
    pub extracted_features_dir: PathBuf,

    #[serde(default = "CorpusConfig::default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Externally produced `{train,test,val}/<composer>/` splits.
    #[serde(default = "CorpusConfig::default_train_test_val_dir")]
    pub train_test_val_dir: PathBuf,

    #[serde(default = "CorpusConfig::default_chunked_output_dir")]
    pub chunked_output_dir: PathBuf,

    #[serde(default = "CorpusConfig::default_composers")]
    pub composers: Vec<String>,

    /// Segments per file for segment profiles.
    /// Default: 3
    #[serde(default = "CorpusConfig::default_num_segments")]
    pub num_segments: usize,
}

impl CorpusConfig {
    fn default_input_dir() -> PathBuf {
        PathBuf::from("./data/raw")
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from("./data/selected")
    }

    fn default_extracted_features_dir() -> PathBuf {
        PathBuf::from("./data/features")
    }

    fn default_reports_dir() -> PathBuf {
        PathBuf::from("./data/reports")
    }

    fn default_train_test_val_dir() -> PathBuf {
        PathBuf::from("./data/splits")
    }

    fn default_chunked_output_dir() -> PathBuf {
        PathBuf::from("./data/chunked")
    }

    fn default_composers() -> Vec<String> {
        ["Bach", "Beethoven", "Chopin", "Mozart"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_num_segments() -> usize {
        3
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            input_dir: Self::default_input_dir(),
            output_dir: Self::default_output_dir(),
            extracted_features_dir: Self::default_extracted_features_dir(),
            reports_dir: Self::default_reports_dir(),
            train_test_val_dir: Self::default_train_test_val_dir(),
            chunked_output_dir: Self::default_chunked_output_dir(),
            composers: Self::default_composers(),
            num_segments: Self::default_num_segments(),
        }
    }
}
