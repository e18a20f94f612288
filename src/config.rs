use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from fetchlog.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct AnalyzerConfig {
    pub input: InputConfig,
    pub ingest: IngestConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub on_malformed: MalformedPolicy,
    pub classify_by: Classifier,
    /// Stop reading once a record's `ts` is this many seconds past the first.
    pub max_span_secs: Option<f64>,
    pub track_windows: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub quantiles: Vec<f64>,
    pub ratios: bool,
    pub responses: bool,
    pub windows: bool,
}

/// What to do with a `{` line that fails to decode or lacks a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    #[default]
    Abort,
    Skip,
}

/// How a record's event kind is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    /// Substring search over the raw line.
    #[default]
    Line,
    /// Exact match on the record's `msg` field.
    Msg,
}

// --- Default implementations ---

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("test.txt"),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            on_malformed: MalformedPolicy::Abort,
            classify_by: Classifier::Line,
            max_span_secs: None,
            track_windows: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            quantiles: vec![0.9, 0.99],
            ratios: false,
            responses: false,
            windows: false,
        }
    }
}

/// Load config from `path`. A missing file yields the defaults; an unreadable
/// or invalid one is an error.
pub fn load_config(path: &Path) -> Result<AnalyzerConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(AnalyzerConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&dir.path().join("fetchlog.toml")).unwrap();
        assert_eq!(cfg.input.path, PathBuf::from("test.txt"));
        assert_eq!(cfg.ingest.on_malformed, MalformedPolicy::Abort);
        assert_eq!(cfg.ingest.classify_by, Classifier::Line);
        assert_eq!(cfg.report.quantiles, vec![0.9, 0.99]);
        assert!(!cfg.report.ratios);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetchlog.toml");
        std::fs::write(
            &path,
            "[ingest]\non_malformed = \"skip\"\nmax_span_secs = 300.0\n\n[report]\nratios = true\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.ingest.on_malformed, MalformedPolicy::Skip);
        assert_eq!(cfg.ingest.max_span_secs, Some(300.0));
        assert_eq!(cfg.ingest.classify_by, Classifier::Line);
        assert!(cfg.report.ratios);
        assert_eq!(cfg.report.quantiles, vec![0.9, 0.99]);
        assert_eq!(cfg.input.path, PathBuf::from("test.txt"));
    }

    #[test]
    fn classifier_parses_msg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetchlog.toml");
        std::fs::write(&path, "[ingest]\nclassify_by = \"msg\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.ingest.classify_by, Classifier::Msg);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetchlog.toml");
        std::fs::write(&path, "[report\nquantiles = ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn unknown_policy_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetchlog.toml");
        std::fs::write(&path, "[ingest]\non_malformed = \"ignore\"\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
