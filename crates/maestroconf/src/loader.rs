//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, MaestroConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/maestro/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("maestro/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("maestro.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read one config file as a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

pub(crate) fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, toml::Value::Table(incoming));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table over the compiled defaults and expand paths.
pub(crate) fn from_table(table: toml::Table, path: &Path) -> Result<MaestroConfig, ConfigError> {
    let mut config: MaestroConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    expand_config_paths(&mut config);
    Ok(config)
}

fn expand_config_paths(config: &mut MaestroConfig) {
    let expand = |p: &mut PathBuf| {
        let expanded = expand_path(&p.to_string_lossy());
        *p = expanded;
    };

    let paths = &mut config.paths;
    expand(&mut paths.model_dir);
    expand(&mut paths.checkpoint);
    expand(&mut paths.scaler);
    expand(&mut paths.program_freq);
    expand(&mut paths.samples_dir);
    if let Some(soundfont) = paths.soundfont.as_mut() {
        expand(soundfont);
    }

    let corpus = &mut config.corpus;
    expand(&mut corpus.input_dir);
    expand(&mut corpus.output_dir);
    expand(&mut corpus.extracted_features_dir);
    expand(&mut corpus.reports_dir);
    expand(&mut corpus.train_test_val_dir);
    expand(&mut corpus.chunked_output_dir);
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut MaestroConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from any key lookup. Later keys in each group win.
pub fn apply_overrides_from(
    config: &mut MaestroConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut take = |key: &str| {
        let value = lookup(key)?;
        sources.env_overrides.push(key.to_string());
        Some(value)
    };

    // Artifact paths
    if let Some(v) = take("MAESTRO_MODEL_DIR") {
        config.paths.model_dir = expand_path(&v);
    }
    if let Some(v) = take("MAESTRO_CHECKPOINT") {
        config.paths.checkpoint = expand_path(&v);
    }
    if let Some(v) = take("MAESTRO_SCALER") {
        config.paths.scaler = expand_path(&v);
    }
    if let Some(v) = take("MAESTRO_PROGRAM_FREQ") {
        config.paths.program_freq = expand_path(&v);
    }
    if let Some(v) = take("MAESTRO_SAMPLES_DIR") {
        config.paths.samples_dir = expand_path(&v);
    }
    if let Some(v) = take("MAESTRO_SOUNDFONT") {
        config.paths.soundfont = Some(expand_path(&v));
    }

    // Listener
    if let Some(v) = take("MAESTRO_HOST") {
        config.bind.host = v;
    }
    // PORT is what most hosting platforms inject
    for key in ["MAESTRO_HTTP_PORT", "PORT"] {
        if let Some(port) = take(key).and_then(|v| v.trim().parse().ok()) {
            config.bind.http_port = port;
        }
    }

    // Telemetry
    for key in ["MAESTRO_OTLP_ENDPOINT", "OTEL_EXPORTER_OTLP_ENDPOINT"] {
        if let Some(v) = take(key) {
            config.telemetry.otlp_endpoint = v;
        }
    }
    for key in ["MAESTRO_LOG_LEVEL", "RUST_LOG"] {
        if let Some(v) = take(key) {
            config.telemetry.log_level = v;
        }
    }

    // Pipeline
    if let Some(size) = take("MAESTRO_CHUNK_SIZE").and_then(|v| v.trim().parse().ok()) {
        config.features.chunk_size = size;
    }
    if let Some(v) = take("MAESTRO_CORPUS_INPUT_DIR") {
        config.corpus.input_dir = expand_path(&v);
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table(s: &str) -> toml::Table {
        parse_table(s, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/models/scaler.json");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("models/scaler.json"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files_with_override(None);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = from_table(
            table("[paths]\nscaler = \"/custom/scaler.json\"\n"),
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(config.paths.scaler, PathBuf::from("/custom/scaler.json"));
        // Other values should be defaults
        assert_eq!(config.bind.http_port, 8000);
        assert_eq!(config.features.chunk_size, 200);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[paths]
checkpoint = "/srv/model/classifier.json"
soundfont = "/usr/share/sounds/sf2/default.sf2"

[bind]
host = "127.0.0.1"
http_port = 9000

[telemetry]
otlp_endpoint = "127.0.0.1:4317"
log_level = "debug"

[features]
chunk_size = 128

[predict]
default_top_k = 2

[corpus]
composers = ["Bach", "Chopin"]
num_segments = 4
"#;
        let config = from_table(table(toml), Path::new("test.toml")).unwrap();

        assert_eq!(config.paths.checkpoint, PathBuf::from("/srv/model/classifier.json"));
        assert_eq!(
            config.paths.soundfont,
            Some(PathBuf::from("/usr/share/sounds/sf2/default.sf2"))
        );
        assert_eq!(config.bind.host, "127.0.0.1");
        assert_eq!(config.bind.http_port, 9000);
        assert!(config.telemetry.otlp_enabled());
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.features.chunk_size, 128);
        assert_eq!(config.predict.default_top_k, 2);
        assert_eq!(config.corpus.composers, vec!["Bach", "Chopin"]);
        assert_eq!(config.corpus.num_segments, 4);
    }

    #[test]
    fn test_bad_type_is_parse_error() {
        let err = from_table(table("[bind]\nhttp_port = \"eighty\"\n"), Path::new("x.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut base = table("[bind]\nhost = \"10.0.0.1\"\nhttp_port = 8000\n");
        merge_tables(&mut base, table("[bind]\nhttp_port = 9000\n"));

        let config = from_table(base, Path::new("merged")).unwrap();
        assert_eq!(config.bind.host, "10.0.0.1");
        assert_eq!(config.bind.http_port, 9000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MAESTRO_HTTP_PORT", "7000"),
            ("PORT", "7100"),
            ("MAESTRO_CHUNK_SIZE", "64"),
            ("RUST_LOG", "warn"),
            ("MAESTRO_SOUNDFONT", "/sf2/piano.sf2"),
        ]
        .into_iter()
        .collect();

        let mut config = MaestroConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| env.get(k).map(|v| v.to_string()));

        // PORT is applied after MAESTRO_HTTP_PORT
        assert_eq!(config.bind.http_port, 7100);
        assert_eq!(config.features.chunk_size, 64);
        assert_eq!(config.telemetry.log_level, "warn");
        assert_eq!(config.paths.soundfont, Some(PathBuf::from("/sf2/piano.sf2")));
        assert_eq!(sources.env_overrides.len(), 5);
    }

    #[test]
    fn test_unparseable_port_is_ignored() {
        let mut config = MaestroConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            (k == "PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.bind.http_port, 8000);
    }
}
