//! Infrastructure configuration: artifact locations, listener, telemetry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem locations of the model bundle and service assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the model artifacts.
    /// Default: ./model
    #[serde(default = "PathsConfig::default_model_dir")]
    pub model_dir: PathBuf,

    /// Classifier checkpoint (JSON).
    /// Default: ./model/classifier.json
    #[serde(default = "PathsConfig::default_checkpoint")]
    pub checkpoint: PathBuf,

    /// Fitted standard scaler (JSON).
    /// Default: ./model/scaler.json
    #[serde(default = "PathsConfig::default_scaler")]
    pub scaler: PathBuf,

    /// Program-frequency table (JSON, string keys).
    /// Default: ./model/program_freq.json
    #[serde(default = "PathsConfig::default_program_freq")]
    pub program_freq: PathBuf,

    /// Sample MIDI files offered on the upload page.
    /// Default: ./static/test
    #[serde(default = "PathsConfig::default_samples_dir")]
    pub samples_dir: PathBuf,

    /// SoundFont for audio previews. Previews are disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soundfont: Option<PathBuf>,
}

impl PathsConfig {
    fn default_model_dir() -> PathBuf {
        PathBuf::from("./model")
    }

    fn default_checkpoint() -> PathBuf {
        PathBuf::from("./model/classifier.json")
    }

    fn default_scaler() -> PathBuf {
        PathBuf::from("./model/scaler.json")
    }

    fn default_program_freq() -> PathBuf {
        PathBuf::from("./model/program_freq.json")
    }

    fn default_samples_dir() -> PathBuf {
        PathBuf::from("./static/test")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model_dir: Self::default_model_dir(),
            checkpoint: Self::default_checkpoint(),
            scaler: Self::default_scaler(),
            program_freq: Self::default_program_freq(),
            samples_dir: Self::default_samples_dir(),
            soundfont: None,
        }
    }
}

/// Network bind address for the HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 8000
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        8000
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export.
    /// Default: empty
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log filter directive (trace, debug, info, warn, error or an EnvFilter string).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}
