//! Configuration schema (diagtrack.toml)

use serde::{Deserialize, Serialize};

/// Delimiters and naming conventions of the persisted capture formats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureFormat {
    /// Line opening every diagnostic block
    pub diagnostic_delimiter: String,

    /// Line opening every matched pair in a transition file
    pub match_delimiter: String,

    /// Line separating the old and new block of a matched pair (compared trimmed)
    pub match_separator: String,

    /// Header of the unmatched-old (departed) section
    pub unmatched_old_header: String,

    /// Header of the unmatched-new (arrived) section
    pub unmatched_new_header: String,

    /// File extension marking a capture as excluded
    pub excluded_suffix: String,

    /// Directory name under which projects are checked out; location paths are
    /// made relative to `<root_marker>/<project>/` when it is present
    pub root_marker: Option<String>,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            diagnostic_delimiter: "----DIAGNOSTIC".to_string(),
            match_delimiter: "--------Matches".to_string(),
            match_separator: "to".to_string(),
            unmatched_old_header: "--------Unmatched old".to_string(),
            unmatched_new_header: "--------Unmatched new".to_string(),
            excluded_suffix: "skip".to_string(),
            root_marker: None,
        }
    }
}

impl CaptureFormat {
    /// Strip the checkout prefix from an analyzer-reported path
    pub fn relative_path(&self, path: &str) -> String {
        if let Some(marker) = &self.root_marker {
            let parts: Vec<&str> = path.split('/').collect();
            if let Some(i) = parts.iter().position(|p| p == marker) {
                if parts.len() > i + 2 {
                    return parts[i + 2..].join("/");
                }
            }
        }

        path.to_string()
    }

    /// Separator line as written back to transition files
    pub fn separator_line(&self) -> String {
        format!("  {}", self.match_separator)
    }
}

/// How disagreeing snapshots of one revision are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsensusPolicy {
    /// The capture with the most diagnostics overwrites its siblings
    LargestWins,

    /// Plan and report overwrites without touching any file
    ReportOnly,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self::LargestWins
    }
}

/// Filter applied to mistracked findings before they are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZombieFilter {
    /// Report every mistracked finding
    None,

    /// Suppress findings that vanish at exactly one revision and are present
    /// on both sides of it. Best-effort guess that the build failed there.
    TransientBuildFailure,
}

impl Default for ZombieFilter {
    fn default() -> Self {
        Self::TransientBuildFailure
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub policy: ConsensusPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub zombie_filter: ZombieFilter,
}

/// Review sampling parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Keep one in `factor` findings
    #[serde(default = "default_sampling_factor")]
    pub factor: usize,

    /// Fixed seed for reproducible samples
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_sampling_factor() -> usize {
    5
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            factor: default_sampling_factor(),
            seed: None,
        }
    }
}

/// External source formatter used when materializing files for inspection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterConfig {
    /// Program and arguments; source is piped through stdin/stdout
    #[serde(default)]
    pub command: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub format: CaptureFormat,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config.sampling.factor == 0 {
            return Err(ConfigError::ParseError(
                "sampling.factor must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        crate::capture::write_atomic(path, toml.as_bytes())
            .map_err(|e| ConfigError::IoError(e.to_string()))
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.format.diagnostic_delimiter, "----DIAGNOSTIC");
        assert_eq!(config.consensus.policy, ConsensusPolicy::LargestWins);
        assert_eq!(config.reconcile.zombie_filter, ZombieFilter::TransientBuildFailure);
        assert_eq!(config.sampling.factor, 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [format]
            root_marker = "java-corpus"

            [consensus]
            policy = "report-only"

            [reconcile]
            zombie_filter = "none"
            "#,
        )
        .unwrap();

        assert_eq!(config.format.root_marker.as_deref(), Some("java-corpus"));
        assert_eq!(config.format.match_delimiter, "--------Matches");
        assert_eq!(config.consensus.policy, ConsensusPolicy::ReportOnly);
        assert_eq!(config.reconcile.zombie_filter, ZombieFilter::None);
    }

    #[test]
    fn save_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagtrack.toml");

        let mut config = Config::default();
        config.formatter.command = vec!["fmt".to_string(), "-".to_string()];
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn zero_sampling_factor_rejected() {
        let err = Config::from_toml("[sampling]\nfactor = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn relative_path_strips_checkout_prefix() {
        let format = CaptureFormat {
            root_marker: Some("java-corpus".to_string()),
            ..CaptureFormat::default()
        };

        assert_eq!(
            format.relative_path("/home/me/java-corpus/guice/core/src/Foo.java"),
            "core/src/Foo.java"
        );
        assert_eq!(format.relative_path("src/Bar.java"), "src/Bar.java");
        assert_eq!(CaptureFormat::default().relative_path("/abs/x.java"), "/abs/x.java");
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.format, parsed.format);
        assert_eq!(config.sampling, parsed.sampling);
    }
}
