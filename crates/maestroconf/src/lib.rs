//! Layered configuration for the maestro prediction service and corpus tools.
//!
//! Configuration is split into two parts:
//!
//! - **Infrastructure** (`paths`, `bind`, `telemetry`): where artifacts live,
//!   where the service listens, where traces go.
//!
//! - **Pipeline** (`features`, `predict`, `corpus`): knobs for feature
//!   extraction, the prediction endpoint and the batch preprocessing commands.
//!
//! # Usage
//!
//! ```rust,no_run
//! use maestroconf::MaestroConfig;
//!
//! let config = MaestroConfig::load().expect("Failed to load config");
//!
//! println!("Scaler: {}", config.paths.scaler.display());
//! println!("Chunk size: {}", config.features.chunk_size);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/maestro/config.toml` (system)
//! 2. `~/.config/maestro/config.toml` (user)
//! 3. `./maestro.toml` or a `--config` path (local override)
//! 4. Environment variables (`MAESTRO_*`, plus `PORT`, `RUST_LOG` and
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`)
//!
//! Files are merged table by table, so a local file only needs the keys it
//! changes.
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! checkpoint = "~/models/composer/classifier.json"
//! soundfont = "/usr/share/sounds/sf2/FluidR3_GM.sf2"
//!
//! [bind]
//! http_port = 8000
//!
//! [features]
//! chunk_size = 200
//!
//! [corpus]
//! composers = ["Bach", "Chopin"]
//! ```

pub mod infra;
pub mod loader;
pub mod pipeline;

pub use infra::{BindConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use pipeline::{CorpusConfig, FeaturesConfig, PredictConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Complete maestro configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MaestroConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub predict: PredictConfig,

    #[serde(default)]
    pub corpus: CorpusConfig,
}

impl MaestroConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/maestro/config.toml`
    /// 3. `~/.config/maestro/config.toml`
    /// 4. `./maestro.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` standing in for `./maestro.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Parse a single TOML document over the compiled defaults, without
    /// consulting files or the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let path = Path::new("<string>");
        let table = loader::parse_table(contents, path)?;
        let config = loader::from_table(table, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.features.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "features.chunk_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.predict.default_top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "predict.default_top_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.corpus.num_segments == 0 {
            return Err(ConfigError::Invalid {
                key: "corpus.num_segments".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind.host, self.bind.http_port)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let body = toml::to_string_pretty(self).unwrap_or_default();
        format!("# maestro configuration\n\n{}", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MaestroConfig::default();
        assert_eq!(config.bind.http_port, 8000);
        assert_eq!(config.features.chunk_size, 200);
        assert_eq!(config.predict.default_top_k, 3);
        assert_eq!(config.corpus.composers.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = MaestroConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[features]"));

        let parsed = MaestroConfig::from_toml_str(&toml).unwrap();
        assert_eq!(parsed.bind.http_port, config.bind.http_port);
        assert_eq!(parsed.paths.scaler, config.paths.scaler);
    }

    #[test]
    fn test_zero_chunk_size_is_invalid() {
        let err = MaestroConfig::from_toml_str("[features]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "features.chunk_size"));
    }

    #[test]
    fn test_cli_path_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[corpus]\nnum_segments = 5\n").unwrap();

        let (config, sources) = MaestroConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.corpus.num_segments, 5);
        assert_eq!(sources.files.last(), Some(&path));
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[bind\nhttp_port = 1").unwrap();

        let err = MaestroConfig::load_from(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if p == &path));
    }

    #[test]
    fn test_bind_addr() {
        let config = MaestroConfig::from_toml_str("[bind]\nhost = \"127.0.0.1\"\nhttp_port = 9001\n")
            .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9001");
    }
}
